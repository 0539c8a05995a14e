//! Per-partner state: the deserialised pool, section vectors, and the
//! flags/maps the TC Server reconciles every tick. Grounded on
//! `backend-rust/src/state.rs`'s `RaceState` — one mutable struct of
//! per-entity vectors/maps, updated in place by whichever module owns the
//! behaviour, with no further indirection.

use std::collections::HashMap;

use crate::ddi::Ddi;
use crate::ddop::Pool;
use crate::section_state::SectionState;

/// Spec §3 bounds `number_of_sections` to `[0, 256]`, but the AOG heartbeat
/// (§4.1.4) reports the count in a single byte, which can only carry up to
/// 255. Capping here keeps that invariant honest end to end rather than
/// letting a 256-section pool silently desync the heartbeat's declared
/// count from its actual one — see DESIGN.md.
const MAX_SECTIONS: usize = 255;
const WINDOW: usize = 16;

#[derive(Debug)]
pub struct ClientState {
    pub pool: Pool,
    pub number_of_sections: usize,
    pub section_setpoint_states: Vec<SectionState>,
    pub section_actual_states: Vec<SectionState>,
    pub setpoint_work_state: bool,
    pub actual_work_state: bool,
    pub section_control_enabled: bool,
    pub measurement_commands_sent: bool,
    pub ddi_to_element_number: HashMap<Ddi, u16>,
    /// Per-element master override (sub-boom master). Declared per spec's
    /// interface but no inbound path writes it yet — see DESIGN.md.
    pub element_work_state: HashMap<u16, bool>,
}

impl ClientState {
    pub fn new(pool: Pool) -> Self {
        let number_of_sections = pool.count_sections().min(MAX_SECTIONS);
        ClientState {
            pool,
            number_of_sections,
            section_setpoint_states: vec![SectionState::Off; number_of_sections],
            section_actual_states: vec![SectionState::Off; number_of_sections],
            setpoint_work_state: false,
            actual_work_state: false,
            section_control_enabled: false,
            measurement_commands_sent: false,
            ddi_to_element_number: HashMap::new(),
            element_work_state: HashMap::new(),
        }
    }

    /// Reads past `number_of_sections` report `NotInstalled` rather than
    /// panicking — invariant #2.
    pub fn read_actual(&self, index: usize) -> SectionState {
        self.section_actual_states
            .get(index)
            .copied()
            .unwrap_or(SectionState::NotInstalled)
    }

    pub fn read_setpoint(&self, index: usize) -> SectionState {
        self.section_setpoint_states
            .get(index)
            .copied()
            .unwrap_or(SectionState::NotInstalled)
    }

    /// Writes past `number_of_sections` are silently dropped — invariant #2.
    pub fn write_actual(&mut self, index: usize, state: SectionState) {
        if let Some(slot) = self.section_actual_states.get_mut(index) {
            *slot = state;
        }
    }

    fn write_setpoint(&mut self, index: usize, state: SectionState) {
        if let Some(slot) = self.section_setpoint_states.get_mut(index) {
            *slot = state;
        }
    }

    /// Unpacks a 32-bit condensed work state word into 16 section states,
    /// writing them starting at `offset`, dropping any index that would
    /// land past `number_of_sections` — invariant #2.
    pub fn unpack_actual_condensed(&mut self, offset: usize, value: u32) {
        for bit in 0..WINDOW {
            let state = SectionState::from(((value >> (2 * bit)) & 0b11) as u8);
            self.write_actual(offset + bit, state);
        }
    }

    /// §4.1.2: diff `desired` against the current setpoint vector and pack
    /// every 16-section window that changed since its last flush. Returns
    /// `(window_index, packed_word)` pairs in ascending window order.
    ///
    /// Entry-gating (calling this only when `section_control_enabled` is
    /// true) is the caller's responsibility — see `TcServer::update_section_states`
    /// and the §9 design note on gate placement.
    pub fn apply_desired_setpoints(&mut self, desired: &[bool]) -> Vec<(usize, u32)> {
        let mut flushes = Vec::new();
        let mut dirty = false;
        let mut window_start = 0usize;

        for i in 0..self.number_of_sections {
            let want = SectionState::from(*desired.get(i).unwrap_or(&false));
            if self.section_setpoint_states[i] != want {
                self.write_setpoint(i, want);
                dirty = true;
            }
            if (i + 1) % WINDOW == 0 {
                if dirty {
                    flushes.push((window_start, self.pack_setpoint_window(window_start)));
                    dirty = false;
                }
                window_start = i + 1;
            }
        }
        if dirty {
            flushes.push((window_start, self.pack_setpoint_window(window_start)));
        }
        flushes
    }

    fn pack_setpoint_window(&self, window_start: usize) -> u32 {
        pack_window(&self.section_setpoint_states, window_start)
    }

    pub fn any_setpoint_on(&self) -> bool {
        self.section_setpoint_states.iter().any(|s| s.is_on())
    }
}

/// Packs 16 consecutive section states starting at `window_start` into a
/// 32-bit word, little-endian in the 2-bit slots: section `i` occupies bits
/// `2i..2i+1`. Sections past the end of `states` pack as 0 (OFF), not
/// NOT_INSTALLED — the wire value only ever carries ON/OFF/ERROR.
pub fn pack_window(states: &[SectionState], window_start: usize) -> u32 {
    let mut word = 0u32;
    for bit in 0..WINDOW {
        let index = window_start + bit;
        let bits = states.get(index).copied().unwrap_or(SectionState::Off) as u32 & 0b11;
        word |= bits << (2 * bit);
    }
    word
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ddop::test_fixtures::three_section_pool_bytes;

    fn three_section_state() -> ClientState {
        ClientState::new(Pool::parse(&three_section_pool_bytes()).unwrap())
    }

    /// Builds raw pool bytes for a pool with `count` bare `Section`
    /// `DeviceElement`s and nothing else — enough to exercise
    /// `count_sections()` well past the heartbeat's one-byte limit without
    /// hand-writing hundreds of fixture bytes per test.
    fn pool_bytes_with_n_sections(count: u16) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.push(1); // version
        buf.extend_from_slice(&count.to_le_bytes());
        for id in 0..count {
            buf.push(1); // DeviceElement tag
            buf.extend_from_slice(&id.to_le_bytes()); // id
            buf.extend_from_slice(&id.to_le_bytes()); // number
            buf.push(3); // Section
            buf.extend_from_slice(&0u16.to_le_bytes()); // no children
        }
        buf
    }

    #[test]
    fn number_of_sections_is_capped_at_255_for_the_one_byte_heartbeat_count() {
        let pool = Pool::parse(&pool_bytes_with_n_sections(300)).unwrap();
        let s = ClientState::new(pool);
        assert_eq!(s.number_of_sections, 255);
        assert_eq!(s.section_setpoint_states.len(), 255);
        assert_eq!(s.section_actual_states.len(), 255);
    }

    #[test]
    fn vectors_track_number_of_sections() {
        let s = three_section_state();
        assert_eq!(s.number_of_sections, 3);
        assert_eq!(s.section_setpoint_states.len(), 3);
        assert_eq!(s.section_actual_states.len(), 3);
    }

    #[test]
    fn bounded_writes_are_no_ops_and_reads_report_not_installed() {
        let mut s = three_section_state();
        s.write_actual(10, SectionState::On);
        assert_eq!(s.read_actual(10), SectionState::NotInstalled);
        assert_eq!(s.section_actual_states.len(), 3);
    }

    #[test]
    fn unpack_condensed_drops_writes_past_section_count() {
        let mut s = three_section_state();
        // bits: section0=On(01), section1=On(01), rest Off — but only 3 sections exist
        let value = 0b00_01_01u32;
        s.unpack_actual_condensed(0, value);
        assert_eq!(s.read_actual(0), SectionState::On);
        assert_eq!(s.read_actual(1), SectionState::On);
        assert_eq!(s.read_actual(2), SectionState::Off);
    }

    #[test]
    fn apply_desired_setpoints_flushes_dirty_windows_only() {
        let mut s = three_section_state();
        s.number_of_sections = 20;
        s.section_setpoint_states = vec![SectionState::Off; 20];

        let mut desired = vec![true; 17];
        desired.extend(vec![false; 3]);
        let flushes = s.apply_desired_setpoints(&desired);

        assert_eq!(flushes.len(), 2);
        assert_eq!(flushes[0].0, 0);
        assert_eq!(flushes[1].0, 16);

        // window 0: sections 0..16 all on -> all 16 slots = 0b01
        let expected_window0: u32 = (0..16).map(|i| 0b01u32 << (2 * i)).sum();
        assert_eq!(flushes[0].1, expected_window0);

        // window 1: only section 16 (local bit 0) is on, rest off/padding
        assert_eq!(flushes[1].1, 0b01);
    }

    #[test]
    fn no_changes_means_no_flush() {
        let mut s = three_section_state();
        let desired = vec![false; 3];
        assert!(s.apply_desired_setpoints(&desired).is_empty());
    }
}
