//! The ISO 11783 transport/CAN link boundary. The spec treats the CAN link
//! driver and ISO 11783 transport layer as external collaborators with a
//! thin contract; this module is that contract, expressed as the §9 design
//! note prefers: "a value type that provides a set of callback functions
//! ... registered with the CAN stack at construction — no inheritance
//! required", rather than subclassing a library base.
//!
//! `LoopbackCanStack` is the one concrete implementation in this crate: an
//! in-process stand-in used for local testing and as the default when no
//! physical adapter is reachable (DESIGN.md's Open Question decision on the
//! named-adapter fallback).

use std::time::Duration;

use crate::client_store::{ActivateOutcome, PartnerId};

/// The hooks the TC Server exposes to the CAN stack, invoked on CAN-receive
/// (spec §4.1). A CAN stack backed by real hardware running its own OS
/// thread MUST marshal these calls onto the event-loop task (e.g. via a
/// bounded channel) rather than invoking them directly from its own thread
/// — see SPEC_FULL.md §5.
pub trait TcServerHooks {
    fn store_pool(&mut self, partner: PartnerId, chunk: Vec<u8>, append: bool);
    fn activate_pool(&mut self, partner: PartnerId) -> ActivateOutcome;
    fn deactivate_pool(&mut self, partner: PartnerId);
    fn delete_pool(&mut self, partner: PartnerId);
    fn pool_stored_by_structure_label(&self, partner: PartnerId, label: &[u8]) -> bool;
    fn pool_stored_by_localization_label(&self, partner: PartnerId, label: &[u8]) -> bool;
    fn enough_memory(&self, size: u32) -> bool;
    fn identify_task_controller(&self, number: u8);
    fn on_client_timeout(&mut self, partner: PartnerId);
    fn on_value_command(
        &mut self,
        partner: PartnerId,
        ddi: u16,
        element: u16,
        value: i32,
        error_codes: &mut u8,
    ) -> bool;
    fn on_process_data_acknowledge(&mut self, partner: PartnerId, ddi: u16, element: u16, error_codes: u8);
    fn on_change_designator(&mut self, partner: PartnerId, object_id: u16, designator: &str) -> bool;
}

/// Cyclic ISO 11783 speed broadcast (navigation-based machine speed).
pub trait SpeedInterface {
    fn set_machine_speed_mm_s(&mut self, speed_mm_s: i32);
    fn update(&mut self);
    fn last_speed_mm_s(&self) -> i32;
}

/// The CAN stack's outward-facing surface: transmitting SET-VALUEs and
/// subscription requests, and pumping the underlying ISO 11783 transport.
pub trait CanStack {
    fn update(&mut self);
    fn terminate(&mut self);
    fn send_set_value(&mut self, partner: PartnerId, ddi: u16, element: u16, value: i32) -> bool;
    fn request_on_change_subscription(&mut self, partner: PartnerId, ddi: u16, element: u16, threshold: i32) -> bool;
    fn request_time_interval_subscription(&mut self, partner: PartnerId, ddi: u16, element: u16, interval_ms: u32) -> bool;
    fn speed_interface(&mut self) -> &mut dyn SpeedInterface;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentSetValue {
    pub partner: PartnerId,
    pub ddi: u16,
    pub element: u16,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Subscription {
    pub partner: PartnerId,
    pub ddi: u16,
    pub element: u16,
    pub kind: SubscriptionKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubscriptionKind {
    OnChange { threshold: i32 },
    TimeInterval { interval_ms: u32 },
}

#[derive(Debug, Default)]
struct LoopbackSpeed {
    last_speed_mm_s: i32,
}

impl SpeedInterface for LoopbackSpeed {
    fn set_machine_speed_mm_s(&mut self, speed_mm_s: i32) {
        self.last_speed_mm_s = speed_mm_s;
    }
    fn update(&mut self) {}
    fn last_speed_mm_s(&self) -> i32 {
        self.last_speed_mm_s
    }
}

/// In-process CAN stack stand-in. Records every outbound SET-VALUE and
/// subscription request for inspection by tests and by the reference
/// binary when no vendor adapter is wired in (DESIGN.md).
#[derive(Debug, Default)]
pub struct LoopbackCanStack {
    pub sent: Vec<SentSetValue>,
    pub subscriptions: Vec<Subscription>,
    speed: LoopbackSpeed,
    terminated: bool,
}

impl LoopbackCanStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }
}

impl CanStack for LoopbackCanStack {
    fn update(&mut self) {}

    fn terminate(&mut self) {
        self.terminated = true;
    }

    fn send_set_value(&mut self, partner: PartnerId, ddi: u16, element: u16, value: i32) -> bool {
        self.sent.push(SentSetValue { partner, ddi, element, value });
        true
    }

    fn request_on_change_subscription(&mut self, partner: PartnerId, ddi: u16, element: u16, threshold: i32) -> bool {
        self.subscriptions.push(Subscription {
            partner,
            ddi,
            element,
            kind: SubscriptionKind::OnChange { threshold },
        });
        true
    }

    fn request_time_interval_subscription(&mut self, partner: PartnerId, ddi: u16, element: u16, interval_ms: u32) -> bool {
        self.subscriptions.push(Subscription {
            partner,
            ddi,
            element,
            kind: SubscriptionKind::TimeInterval { interval_ms },
        });
        true
    }

    fn speed_interface(&mut self) -> &mut dyn SpeedInterface {
        &mut self.speed
    }
}

/// Address claim is allowed this long before the adapter start is fatal
/// (spec §7).
pub const ADDRESS_CLAIM_TIMEOUT: Duration = Duration::from_secs(5);

/// Silence this long with no frames from a partner before the CAN stack
/// reports a timeout (spec §3).
pub const PARTNER_TIMEOUT: Duration = Duration::from_secs(6);
