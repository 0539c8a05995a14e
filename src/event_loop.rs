//! The single-threaded cooperative scheduler (§4.4): one `tick()` call
//! performs the six steps in order every iteration. Grounded on
//! `backend-rust/src/main.rs::run_engine_tick` (an interval-driven tick
//! function closing over shared handles) and
//! `packages/uwb-simulator/src/main.rs::sim_loop`'s `Instant`-gated cadence
//! inside a single stepped loop.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::aog_udp::{AogUdp, Inbound, HEARTBEAT_SRC, PGN_HEARTBEAT};
use crate::can_stack::CanStack;
use crate::subnet::{Subnet, SubnetStore};
use crate::tc_server::{unpack_desired_bitmap, TcServer};

const HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

pub struct EventLoop {
    udp: AogUdp,
    subnet_store: SubnetStore,
    tc: TcServer,
    last_heartbeat: Instant,
}

impl EventLoop {
    pub fn new(udp: AogUdp, subnet_store: SubnetStore, tc: TcServer) -> Self {
        Self { udp, subnet_store, tc, last_heartbeat: Instant::now() }
    }

    /// One scheduler iteration, steps 1-6 of §4.4, in order.
    pub async fn tick(&mut self, can_stack: &mut dyn CanStack) {
        for inbound in self.udp.handle_address_detection() {
            self.apply_discovery(inbound).await;
        }

        for inbound in self.udp.handle_incoming_packets() {
            self.apply_main(inbound, can_stack);
        }

        self.tc.request_measurement_commands(can_stack);
        can_stack.update();
        can_stack.speed_interface().update();

        if self.last_heartbeat.elapsed() >= HEARTBEAT_INTERVAL {
            self.emit_heartbeats();
            self.last_heartbeat = Instant::now();
        }

        // No sleep: yielding once per iteration bounds CPU use without a
        // second thread or a fixed-delay timer (§4.4 supplement).
        tokio::task::yield_now().await;
    }

    async fn apply_discovery(&mut self, inbound: Inbound) {
        if let Inbound::SubnetAnnounce { subnet } = inbound {
            debug!(?subnet, "subnet announcement received");
            self.subnet_store.set(subnet);
            if let Err(e) = self.udp.rebind_main(subnet).await {
                tracing::warn!(error = %e, "failed to rebind main socket after subnet change");
            }
        }
    }

    fn apply_main(&mut self, inbound: Inbound, can_stack: &mut dyn CanStack) {
        match inbound {
            Inbound::SteerData { speed_mm_s, desired_sections, status: _ } => {
                can_stack.speed_interface().set_machine_speed_mm_s(speed_mm_s);
                // `apply_desired_setpoints` already treats any index past the
                // end of this slice as `false`, so 16 bits here is enough to
                // cover every implement regardless of its own section count.
                let desired = unpack_desired_bitmap(desired_sections, 16);
                self.tc.update_section_states(&desired, can_stack);
            }
            Inbound::SectionControl { enabled } => {
                self.tc.update_section_control_enabled(enabled, can_stack);
            }
            Inbound::SubnetAnnounce { .. } => {
                // only dispatched from the discovery socket; ignore if it
                // somehow arrives on main.
            }
        }
    }

    fn emit_heartbeats(&self) {
        let subnet = self.subnet_store.current();
        for payload in self.tc.heartbeat_payloads() {
            self.udp.send(subnet, HEARTBEAT_SRC, PGN_HEARTBEAT, payload);
        }
    }

    pub fn subnet(&self) -> Subnet {
        self.subnet_store.current()
    }

    pub fn tc_mut(&mut self) -> &mut TcServer {
        &mut self.tc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::can_stack::LoopbackCanStack;
    use crate::ddop::test_fixtures::three_section_pool_bytes;
    use crate::client_store::PartnerId;

    async fn loopback_loop() -> EventLoop {
        let udp = AogUdp::bind_for_test().await.expect("bind loopback sockets for test");
        EventLoop::new(udp, subnet_store_for_test(), TcServer::new())
    }

    fn subnet_store_for_test() -> SubnetStore {
        let path = std::env::temp_dir().join(format!("aog-tc-event-loop-test-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        SubnetStore::load_at_for_test(path)
    }

    #[tokio::test]
    async fn section_control_toggle_routes_through_tc_server() {
        let mut event_loop = loopback_loop().await;
        let partner = PartnerId(1);
        event_loop.tc_mut().store_pool(partner, three_section_pool_bytes(), false);
        let outcome = event_loop.tc_mut().activate_pool(partner);
        assert!(outcome.ok);

        let mut can = LoopbackCanStack::new();
        event_loop.tc_mut().request_measurement_commands(&mut can);
        event_loop.apply_main(Inbound::SectionControl { enabled: true }, &mut can);

        assert!(can.sent.iter().any(|s| s.ddi == crate::ddi::SECTION_CONTROL_STATE && s.value == 1));
    }

    #[tokio::test]
    async fn subnet_announcement_updates_the_event_loop_subnet() {
        let mut event_loop = loopback_loop().await;
        assert_eq!(event_loop.subnet(), Subnet::default());

        let announced = Subnet { a: 16, b: 32, c: 48 };
        event_loop.apply_discovery(Inbound::SubnetAnnounce { subnet: announced }).await;

        assert_eq!(event_loop.subnet(), announced);
    }
}
