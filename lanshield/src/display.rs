use crate::utils::format_utils::format_mac;
use lanshield_common::HostRateStats;
use std::collections::HashMap;

// Render the per-host rate table on the terminal
pub fn render(rate_stats: &HashMap<[u8; 6], HostRateStats>, banned: &[[u8; 6]]) {
    // Clear screen
    print!("\x1B[2J\x1B[1;1H");

    println!(
        "{:<17} | {:>10} | {:>6} | {}",
        "MAC", "Rate", "Tick", "Status"
    );
    println!("{:-<50}", "");

    let mut rows: Vec<_> = rate_stats.iter().collect();
    rows.sort_by_key(|(mac, _)| **mac);

    for (mac, stats) in rows {
        let status = if banned.contains(mac) {
            "BANNED"
        } else if !stats.window_filled {
            "warming up"
        } else {
            ""
        };
        println!(
            "{:<17} | {:>7} KB | {:>6} | {}",
            format_mac(mac),
            stats.rate_kb,
            stats.sampled_tick,
            status
        );
    }

    if !banned.is_empty() {
        println!();
        println!("--- Currently banned hosts ---");
        for mac in banned {
            println!("{}", format_mac(mac));
        }
    }
}
