use std::collections::HashMap;

/// Fixed-size ring of the most recent per-tick rate samples for one host.
///
/// Slots start out empty and are only ever overwritten, never cleared, so
/// once the ring has wrapped every read hits real history.
#[derive(Debug)]
struct SampleRing {
    slots: Vec<Option<i64>>,
}

impl SampleRing {
    fn new(window: usize) -> Self {
        Self {
            slots: vec![None; window],
        }
    }
}

/// Per-host circular buffers of rate samples, one slot per control-loop
/// tick. The slot index is always derived from the tick passed in by the
/// caller, so every host observed in the same tick lands in the same slot
/// position regardless of when it was first seen.
pub struct SampleStore {
    window: usize,
    rings: HashMap<[u8; 6], SampleRing>,
}

impl SampleStore {
    pub fn new(window: usize) -> Self {
        assert!(window >= 2, "sample window must hold at least two cycles");
        Self {
            window,
            rings: HashMap::new(),
        }
    }

    /// Overwrite the slot for `tick` with this tick's rate, creating the
    /// host's ring on first use.
    pub fn record(&mut self, tick: u64, mac: [u8; 6], rate_kb: i64) {
        let window = self.window;
        let ring = self
            .rings
            .entry(mac)
            .or_insert_with(|| SampleRing::new(window));
        let idx = (tick % window as u64) as usize;
        ring.slots[idx] = Some(rate_kb);
    }

    /// The sample written for `tick`, or `None` while the host has less
    /// than one full cycle of history.
    pub fn current(&self, tick: u64, mac: &[u8; 6]) -> Option<i64> {
        let ring = self.filled_ring(mac)?;
        ring.slots[(tick % self.window as u64) as usize]
    }

    /// The sample about to be overwritten on the next write, i.e. the oldest
    /// retained sample. At the end of the ring the next write wraps to slot
    /// zero. `None` while the host has less than one full cycle of history.
    pub fn oldest(&self, tick: u64, mac: &[u8; 6]) -> Option<i64> {
        let ring = self.filled_ring(mac)?;
        let mut idx = (tick % self.window as u64) as usize + 1;
        if (tick % self.window as u64) as usize == self.window - 1 {
            idx = 0;
        }
        ring.slots[idx]
    }

    /// Whether every slot of the host's ring holds a real sample.
    pub fn window_filled(&self, mac: &[u8; 6]) -> bool {
        self.filled_ring(mac).is_some()
    }

    fn filled_ring(&self, mac: &[u8; 6]) -> Option<&SampleRing> {
        self.rings
            .get(mac)
            .filter(|ring| ring.slots.iter().all(Option::is_some))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    #[test]
    fn test_accessors_absent_during_warm_up() {
        let mut store = SampleStore::new(5);

        assert_eq!(store.current(0, &MAC), None);
        assert_eq!(store.oldest(0, &MAC), None);

        for tick in 0..4 {
            store.record(tick, MAC, 10);
            // Not evaluable until one full cycle has been recorded.
            assert_eq!(store.current(tick, &MAC), None);
            assert_eq!(store.oldest(tick, &MAC), None);
            assert!(!store.window_filled(&MAC));
        }

        store.record(4, MAC, 10);
        assert!(store.window_filled(&MAC));
        assert_eq!(store.current(4, &MAC), Some(10));
        assert_eq!(store.oldest(4, &MAC), Some(10));
    }

    #[test]
    fn test_current_returns_last_written_sample() {
        let mut store = SampleStore::new(5);
        for tick in 0..7 {
            store.record(tick, MAC, tick as i64 * 100);
        }
        assert_eq!(store.current(6, &MAC), Some(600));
    }

    #[test]
    fn test_oldest_is_slot_about_to_be_overwritten() {
        let mut store = SampleStore::new(5);
        for tick in 0..10 {
            store.record(tick, MAC, tick as i64);
        }

        // tick 9 wrote slot 4; the next write (tick 10) lands in slot 0,
        // which holds the sample from tick 5.
        assert_eq!(store.oldest(9, &MAC), Some(5));

        // Mid-ring: after tick 10 the next victim is slot 1, from tick 6.
        store.record(10, MAC, 10);
        assert_eq!(store.oldest(10, &MAC), Some(6));
    }

    #[test]
    fn test_slots_overwritten_in_place() {
        let mut store = SampleStore::new(5);
        for tick in 0..5 {
            store.record(tick, MAC, 7);
        }
        store.record(7, MAC, 9); // overwrites the slot written at tick 2
        assert_eq!(store.current(7, &MAC), Some(9));
        assert_eq!(store.current(2, &MAC), Some(9));
    }

    #[test]
    fn test_hosts_are_independent() {
        let other = [0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff];
        let mut store = SampleStore::new(5);

        for tick in 0..5 {
            store.record(tick, MAC, 1);
        }
        assert!(store.window_filled(&MAC));
        assert!(!store.window_filled(&other));
        assert_eq!(store.current(4, &other), None);
    }
}
