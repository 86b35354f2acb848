use rand::Rng;

use crate::{
    command::{self, Actuator, CommandError, CommandRequest, Transition},
    config::ControlConfig,
    model::{self, TemperatureFactors},
    types::{DeviceState, NotificationPayload, TemperaturePayload},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEvent {
    Simulate,
    Notify,
}

#[derive(Debug, Clone, Copy)]
struct Periodic {
    period_ms: u64,
    next_due_ms: u64,
}

impl Periodic {
    fn new(period_ms: u64, start_ms: u64) -> Self {
        let period_ms = period_ms.max(1);
        Self {
            period_ms,
            next_due_ms: start_ms.saturating_add(period_ms),
        }
    }

    fn drain_due(&mut self, now_ms: u64, event: TickEvent, due: &mut Vec<(u64, TickEvent)>) {
        while self.next_due_ms <= now_ms {
            due.push((self.next_due_ms, event));
            if self.next_due_ms == u64::MAX {
                break;
            }
            self.next_due_ms = self.next_due_ms.saturating_add(self.period_ms);
        }
    }
}

/// Two independent periodic triggers behind one poll point.
#[derive(Debug, Clone)]
pub struct ControlLoop {
    simulation: Periodic,
    notification: Periodic,
}

impl ControlLoop {
    pub fn new(simulation_interval_ms: u64, notification_interval_ms: u64, start_ms: u64) -> Self {
        Self {
            simulation: Periodic::new(simulation_interval_ms, start_ms),
            notification: Periodic::new(notification_interval_ms, start_ms),
        }
    }

    pub fn from_config(config: &ControlConfig, start_ms: u64) -> Self {
        Self::new(
            config.simulation_interval_ms,
            config.notification_interval_ms,
            start_ms,
        )
    }

    /// Every firing due at or before `now_ms`, oldest first. A simulation
    /// step due at the same instant as a notification runs first.
    pub fn poll(&mut self, now_ms: u64) -> Vec<TickEvent> {
        let mut due = Vec::new();
        self.simulation
            .drain_due(now_ms, TickEvent::Simulate, &mut due);
        self.notification
            .drain_due(now_ms, TickEvent::Notify, &mut due);

        // Stable sort keeps simulation ahead of notification on ties.
        due.sort_by_key(|(at, _)| *at);
        due.into_iter().map(|(_, event)| event).collect()
    }

    pub fn next_due_ms(&self) -> u64 {
        self.simulation
            .next_due_ms
            .min(self.notification.next_due_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationStep {
    pub previous: i32,
    pub current: i32,
}

impl SimulationStep {
    pub fn changed(&self) -> bool {
        self.previous != self.current
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Simulated(SimulationStep),
    Notification(NotificationPayload),
}

/// Owns every piece of mutable node state: device flags, the simulated
/// temperature and the notification sequence counter.
#[derive(Debug, Clone)]
pub struct ThermostatCore {
    state: DeviceState,
    temperature: i32,
    sequence: u16,
    factors: TemperatureFactors,
}

impl ThermostatCore {
    pub fn new(initial_temperature: i32, factors: TemperatureFactors) -> Self {
        Self {
            state: DeviceState::default(),
            temperature: initial_temperature,
            sequence: 0,
            factors,
        }
    }

    pub fn seeded<R: Rng + ?Sized>(rng: &mut R, factors: TemperatureFactors) -> Self {
        Self::new(model::seed_temperature(rng), factors)
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    pub fn temperature(&self) -> i32 {
        self.temperature
    }

    pub fn apply<A: Actuator + ?Sized>(
        &mut self,
        request: CommandRequest,
        actuator: &A,
    ) -> Result<Transition, CommandError> {
        let transition = command::apply(&mut self.state, request)?;
        actuator.signal(transition.device, transition.mode);
        Ok(transition)
    }

    pub fn simulate(&mut self) -> SimulationStep {
        let previous = self.temperature;
        self.temperature = model::tick(&self.state, previous, &self.factors);
        SimulationStep {
            previous,
            current: self.temperature,
        }
    }

    pub fn notify(&mut self) -> NotificationPayload {
        self.sequence = self.sequence.wrapping_add(1);
        NotificationPayload {
            sequence: self.sequence,
            temperature: self.temperature,
        }
    }

    pub fn handle(&mut self, event: TickEvent) -> TickOutcome {
        match event {
            TickEvent::Simulate => TickOutcome::Simulated(self.simulate()),
            TickEvent::Notify => TickOutcome::Notification(self.notify()),
        }
    }

    pub fn status_payload(&self) -> DeviceState {
        self.state
    }

    pub fn temperature_payload(&self) -> TemperaturePayload {
        TemperaturePayload {
            temperature: self.temperature,
        }
    }
}
