//! ISO 11783-11 Data Description Indices this server cares about, and the
//! helpers for the two 16-wide contiguous DDI ranges that carry condensed
//! (16 sections × 2 bits) work state.

use std::ops::RangeInclusive;

/// A Data Description Index, 16 bits on the wire.
pub type Ddi = u16;

pub const ACTUAL_WORK_STATE: Ddi = 0x0140;
pub const SETPOINT_WORK_STATE: Ddi = 0x0141;
pub const SECTION_CONTROL_STATE: Ddi = 0x0142;

/// First of 16 contiguous DDIs: `ActualCondensedWorkState1_16` .. `_241_256`.
pub const ACTUAL_CONDENSED_WORK_STATE_BASE: Ddi = 0x0143;
/// First of 16 contiguous DDIs: `SetpointCondensedWorkState1_16` .. `_241_256`.
pub const SETPOINT_CONDENSED_WORK_STATE_BASE: Ddi = 0x0153;

const CONDENSED_RANGE_LEN: u16 = 16;

pub fn actual_condensed_range() -> RangeInclusive<Ddi> {
    ACTUAL_CONDENSED_WORK_STATE_BASE..=(ACTUAL_CONDENSED_WORK_STATE_BASE + CONDENSED_RANGE_LEN - 1)
}

pub fn setpoint_condensed_range() -> RangeInclusive<Ddi> {
    SETPOINT_CONDENSED_WORK_STATE_BASE
        ..=(SETPOINT_CONDENSED_WORK_STATE_BASE + CONDENSED_RANGE_LEN - 1)
}

/// If `ddi` falls in the condensed range starting at `base`, the index of
/// the first section (0-based) that 16-section window covers.
pub fn section_offset(base: Ddi, ddi: Ddi) -> Option<usize> {
    if ddi >= base && ddi < base + CONDENSED_RANGE_LEN {
        Some(((ddi - base) as usize) * 16)
    } else {
        None
    }
}

/// The condensed DDI that covers the 16-section window starting at
/// `window_start` (must be a multiple of 16).
pub fn condensed_ddi_for_window(base: Ddi, window_start: usize) -> Ddi {
    base + (window_start / 16) as Ddi
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_round_trips_for_every_window() {
        for window in 0..16usize {
            let ddi = condensed_ddi_for_window(ACTUAL_CONDENSED_WORK_STATE_BASE, window * 16);
            assert_eq!(
                section_offset(ACTUAL_CONDENSED_WORK_STATE_BASE, ddi),
                Some(window * 16)
            );
        }
    }

    #[test]
    fn ddi_outside_range_has_no_offset() {
        assert_eq!(
            section_offset(ACTUAL_CONDENSED_WORK_STATE_BASE, ACTUAL_WORK_STATE),
            None
        );
    }
}
