//! The Task Controller state machine: §4.1 of the spec. Grounded on
//! `backend-rust/src/procedure_engine.rs`'s tick-driven state machine shape
//! (`ProcedureEngine::tick() -> TickResult`), generalized here to
//! per-partner reconciliation instead of a single race-wide sequence.

use tracing::debug;

use crate::can_stack::{CanStack, TcServerHooks};
use crate::client_store::{ActivateOutcome, ClientStateStore, PartnerId};
use crate::ddi;
use crate::ddop::{self, Pool};

pub struct TcServer {
    store: ClientStateStore,
}

impl Default for TcServer {
    fn default() -> Self {
        Self::new()
    }
}

impl TcServer {
    pub fn new() -> Self {
        Self { store: ClientStateStore::new() }
    }

    pub fn store(&self) -> &ClientStateStore {
        &self.store
    }

    /// §4.1.1: for every client newly activated and not yet subscribed,
    /// walk the pool once to learn the DDI→element binding and fire
    /// subscription requests. The nested walk is O(pool) per DDI of
    /// interest, not O(pool²) — §9 design note.
    pub fn request_measurement_commands(&mut self, can_stack: &mut dyn CanStack) {
        let partners: Vec<PartnerId> = self
            .store
            .iter()
            .filter(|(_, state)| !state.measurement_commands_sent)
            .map(|(id, _)| id)
            .collect();

        for partner in partners {
            let Some(state) = self.store.get_mut(partner) else { continue };

            for ddi in ddi::actual_condensed_range().chain(std::iter::once(ddi::ACTUAL_WORK_STATE)) {
                bind_and_subscribe(partner, &state.pool, ddi, can_stack, &mut state.ddi_to_element_number, true);
            }

            let onchange_only: Vec<u16> = ddi::setpoint_condensed_range()
                .chain([ddi::SECTION_CONTROL_STATE, ddi::SETPOINT_WORK_STATE])
                .collect();
            for ddi in onchange_only {
                bind_and_subscribe(partner, &state.pool, ddi, can_stack, &mut state.ddi_to_element_number, false);
            }

            state.measurement_commands_sent = true;
        }
    }

    /// §4.1.2, entry-gated per §9's preferred design: skip clients whose
    /// section control is disabled entirely, so no diff is computed and no
    /// state is buffered that would never be sent — invariant #3.
    pub fn update_section_states(&mut self, desired: &[bool], can_stack: &mut dyn CanStack) {
        let partners: Vec<PartnerId> = self.store.partners().collect();
        for partner in partners {
            let Some(state) = self.store.get_mut(partner) else { continue };
            if !state.section_control_enabled {
                continue;
            }

            let flushes = state.apply_desired_setpoints(desired);
            for (window_start, packed) in flushes {
                let ddi = ddi::condensed_ddi_for_window(ddi::SETPOINT_CONDENSED_WORK_STATE_BASE, window_start);
                if let Some(&element) = state.ddi_to_element_number.get(&ddi) {
                    can_stack.send_set_value(partner, ddi, element, packed as i32);
                } else {
                    debug!(?partner, ddi, "no bound element yet for setpoint window, skipping");
                }
            }

            let any_on = state.any_setpoint_on();
            if any_on != state.setpoint_work_state {
                state.setpoint_work_state = any_on;
                if let Some(&element) = state.ddi_to_element_number.get(&ddi::SETPOINT_WORK_STATE) {
                    can_stack.send_set_value(partner, ddi::SETPOINT_WORK_STATE, element, any_on as i32);
                }
            }
        }
    }

    /// §4.1.3.
    pub fn update_section_control_enabled(&mut self, enabled: bool, can_stack: &mut dyn CanStack) {
        let partners: Vec<PartnerId> = self.store.partners().collect();
        for partner in partners {
            let Some(state) = self.store.get_mut(partner) else { continue };
            if state.section_control_enabled == enabled {
                continue;
            }
            state.section_control_enabled = enabled;
            if let Some(&element) = state.ddi_to_element_number.get(&ddi::SECTION_CONTROL_STATE) {
                can_stack.send_set_value(partner, ddi::SECTION_CONTROL_STATE, element, enabled as i32);
            }
        }
    }

    /// §4.1.4: one heartbeat payload per client, regardless of
    /// `section_control_enabled`.
    pub fn heartbeat_payloads(&self) -> Vec<Vec<u8>> {
        self.store
            .iter()
            .map(|(_, state)| {
                // `ClientState::new` caps `number_of_sections` at 255 (the
                // heartbeat's one-byte count field), so this cast is exact,
                // not a clamp.
                let n = state.number_of_sections as u8;
                let mut payload = vec![state.section_control_enabled as u8, n];
                let byte_count = (state.number_of_sections + 7) / 8;
                let mut bits = vec![0u8; byte_count];
                for (i, section_bit) in bits.iter_mut().enumerate().take(byte_count) {
                    let mut byte = 0u8;
                    for b in 0..8 {
                        let index = i * 8 + b;
                        if index < state.number_of_sections && state.read_actual(index).is_on() {
                            byte |= 1 << b;
                        }
                    }
                    *section_bit = byte;
                }
                payload.extend(bits);
                payload
            })
            .collect()
    }
}

fn bind_and_subscribe(
    partner: PartnerId,
    pool: &Pool,
    ddi: u16,
    can_stack: &mut dyn CanStack,
    ddi_to_element_number: &mut std::collections::HashMap<u16, u16>,
    include_time_interval: bool,
) {
    for (process_data, triggers) in pool.process_data_with_ddi(ddi) {
        let Some(element) = pool.elements_containing(process_data.id()).find_map(Pool::element_number) else {
            continue;
        };
        ddi_to_element_number.insert(ddi, element);

        if triggers & ddop::TRIGGER_ON_CHANGE != 0 {
            can_stack.request_on_change_subscription(partner, ddi, element, 1);
        }
        if include_time_interval && triggers & ddop::TRIGGER_TIME_INTERVAL != 0 {
            can_stack.request_time_interval_subscription(partner, ddi, element, 1000);
        }
    }
}

impl TcServerHooks for TcServer {
    fn store_pool(&mut self, partner: PartnerId, chunk: Vec<u8>, _append: bool) {
        self.store.store_pool(partner, chunk);
    }

    fn activate_pool(&mut self, partner: PartnerId) -> ActivateOutcome {
        self.store.activate_pool(partner)
    }

    fn deactivate_pool(&mut self, partner: PartnerId) {
        self.store.deactivate_pool(partner);
    }

    fn delete_pool(&mut self, partner: PartnerId) {
        self.store.delete_pool(partner);
    }

    fn pool_stored_by_structure_label(&self, _partner: PartnerId, _label: &[u8]) -> bool {
        false
    }

    fn pool_stored_by_localization_label(&self, _partner: PartnerId, _label: &[u8]) -> bool {
        false
    }

    fn enough_memory(&self, _size: u32) -> bool {
        true
    }

    fn identify_task_controller(&self, _number: u8) {}

    fn on_client_timeout(&mut self, partner: PartnerId) {
        self.store.on_timeout(partner);
    }

    fn on_value_command(
        &mut self,
        partner: PartnerId,
        ddi: u16,
        _element: u16,
        value: i32,
        _error_codes: &mut u8,
    ) -> bool {
        let Some(state) = self.store.get_mut(partner) else { return false };

        if let Some(offset) = ddi::section_offset(ddi::ACTUAL_CONDENSED_WORK_STATE_BASE, ddi) {
            state.unpack_actual_condensed(offset, value as u32);
        } else if ddi == ddi::SECTION_CONTROL_STATE {
            state.section_control_enabled = value == 1;
        } else if ddi == ddi::ACTUAL_WORK_STATE {
            // Spec's Open Question: the source writes this to
            // `setpoint_work_state` (flagged as likely a bug). This crate
            // takes the spec's own preferred fix — see DESIGN.md.
            state.actual_work_state = value == 1;
        }
        true
    }

    fn on_process_data_acknowledge(&mut self, partner: PartnerId, ddi: u16, element: u16, error_codes: u8) {
        debug!(?partner, ddi, element, error_codes, "process data acknowledge");
    }

    fn on_change_designator(&mut self, _partner: PartnerId, _object_id: u16, _designator: &str) -> bool {
        true
    }
}

/// Called once from `main` per spec §2's data flow: Steer Data carries the
/// desired section bitmap from AOG, unrelated to any single DDOP — sections
/// beyond 16 bits are padded with `false`.
pub fn unpack_desired_bitmap(bitmap: u16, number_of_sections: usize) -> Vec<bool> {
    (0..number_of_sections)
        .map(|i| if i < 16 { (bitmap >> i) & 1 == 1 } else { false })
        .collect()
}
