//! Maps `Box<dyn Error>` from trait boundaries to typed `ControlError`.
//!
//! The traits in `extruder_traits` use `Box<dyn Error + Send + Sync>` so
//! drivers can bring their own error types; this module converts those to our
//! typed enum, with an optional feature-gated path for
//! `extruder_hardware::HwError` downcasting.

use crate::error::ControlError;

/// Map a trait-boundary error to a typed `ControlError`.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> ControlError {
    #[cfg(feature = "hardware-errors")]
    {
        use extruder_hardware::error::HwError;
        if let Some(hw) = e.downcast_ref::<HwError>() {
            return match hw {
                HwError::Timeout(_) | HwError::Motion(_) => ControlError::Hardware(hw.to_string()),
                other => ControlError::HardwareFault(other.to_string()),
            };
        }
    }

    ControlError::Hardware(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_errors_map_to_hardware() {
        let e = std::io::Error::other("bus glitch");
        match map_hw_error(&e) {
            ControlError::Hardware(s) => assert!(s.contains("bus glitch")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(feature = "hardware-errors")]
    #[test]
    fn unknown_pin_is_a_fault() {
        let e = extruder_hardware::HwError::UnknownOutputPin(7);
        assert!(matches!(map_hw_error(&e), ControlError::HardwareFault(_)));
    }
}
