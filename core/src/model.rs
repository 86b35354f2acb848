use std::ops::RangeInclusive;

use rand::Rng;

use crate::types::DeviceState;

pub const INITIAL_TEMPERATURE_RANGE: RangeInclusive<i32> = 11..=30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemperatureFactors {
    pub air_conditioning: i32,
    pub heating: i32,
    pub ventilation_multiplier: i32,
}

impl Default for TemperatureFactors {
    fn default() -> Self {
        Self {
            air_conditioning: -1,
            heating: 1,
            ventilation_multiplier: 2,
        }
    }
}

/// One simulation step. Air conditioning is checked before heating, so a
/// state with both set (never committed by the command path) cools.
///
/// The result is not clamped; it drifts for as long as a device stays on.
pub fn tick(state: &DeviceState, current: i32, factors: &TemperatureFactors) -> i32 {
    let multiplier = if state.ventilation {
        factors.ventilation_multiplier
    } else {
        1
    };

    if state.air_conditioning {
        current.saturating_add(factors.air_conditioning.saturating_mul(multiplier))
    } else if state.heating {
        current.saturating_add(factors.heating.saturating_mul(multiplier))
    } else {
        current
    }
}

pub fn seed_temperature<R: Rng + ?Sized>(rng: &mut R) -> i32 {
    rng.gen_range(INITIAL_TEMPERATURE_RANGE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn state(air_conditioning: bool, heating: bool, ventilation: bool) -> DeviceState {
        DeviceState {
            air_conditioning,
            heating,
            ventilation,
        }
    }

    #[test]
    fn air_conditioning_cools_by_one() {
        assert_eq!(tick(&state(true, false, false), 22, &TemperatureFactors::default()), 21);
    }

    #[test]
    fn ventilation_doubles_cooling() {
        assert_eq!(tick(&state(true, false, true), 22, &TemperatureFactors::default()), 20);
    }

    #[test]
    fn heating_warms() {
        let factors = TemperatureFactors::default();
        assert_eq!(tick(&state(false, true, false), 22, &factors), 23);
        assert_eq!(tick(&state(false, true, true), 22, &factors), 24);
    }

    #[test]
    fn idle_state_never_moves() {
        let factors = TemperatureFactors::default();
        let mut temperature = 17;
        for _ in 0..100 {
            temperature = tick(&state(false, false, false), temperature, &factors);
        }
        assert_eq!(temperature, 17);
    }

    #[test]
    fn ventilation_alone_does_not_move() {
        assert_eq!(tick(&state(false, false, true), 17, &TemperatureFactors::default()), 17);
    }

    #[test]
    fn air_conditioning_wins_when_both_set() {
        assert_eq!(tick(&state(true, true, false), 22, &TemperatureFactors::default()), 21);
        assert_eq!(tick(&state(true, true, true), 22, &TemperatureFactors::default()), 20);
    }

    #[test]
    fn drift_is_unbounded_while_heating() {
        let factors = TemperatureFactors::default();
        let mut temperature = 30;
        for _ in 0..1_000 {
            temperature = tick(&state(false, true, true), temperature, &factors);
        }
        assert_eq!(temperature, 2_030);
    }

    #[test]
    fn drift_saturates_instead_of_overflowing() {
        let factors = TemperatureFactors::default();
        assert_eq!(tick(&state(false, true, true), i32::MAX - 1, &factors), i32::MAX);
        assert_eq!(tick(&state(true, false, true), i32::MIN, &factors), i32::MIN);
    }

    #[test]
    fn seeded_temperature_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..1_000 {
            let value = seed_temperature(&mut rng);
            assert!(INITIAL_TEMPERATURE_RANGE.contains(&value), "{value}");
        }
    }
}
