pub mod format_utils {
    // Format MAC address
    pub fn format_mac(mac: &[u8; 6]) -> String {
        format!(
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
        )
    }
}

pub mod network_utils {
    use anyhow::Context;

    // Parse a colon-separated MAC address string
    pub fn parse_mac_address(mac_str: &str) -> Result<[u8; 6], anyhow::Error> {
        let parts: Vec<&str> = mac_str.split(':').collect();
        if parts.len() != 6 {
            return Err(anyhow::anyhow!("Invalid MAC address format: {}", mac_str));
        }

        let mut mac = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            mac[i] = u8::from_str_radix(part, 16)
                .with_context(|| format!("Invalid MAC segment '{}': not hex", part))?;
        }

        Ok(mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mac_address() {
        let result = network_utils::parse_mac_address("aa:bb:cc:dd:ee:ff");
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

        assert!(network_utils::parse_mac_address("aa:bb:cc:dd:ee").is_err());
        assert!(network_utils::parse_mac_address("aa:bb:cc:dd:ee:zz").is_err());
    }

    #[test]
    fn test_format_mac_round_trip() {
        let mac = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
        let text = format_utils::format_mac(&mac);
        assert_eq!(text, "00:11:22:33:44:55");
        assert_eq!(network_utils::parse_mac_address(&text).unwrap(), mac);
    }
}
