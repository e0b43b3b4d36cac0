use tracing::debug;

/// Outcome of checking a freshly read power value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerCheck {
    /// Within band, possibly after dropping a misread leading digit
    Accepted { power: u64, repaired: bool },
    SuspiciousPowerJump,
    /// No earlier snapshot to compare with
    NoBaseline,
}

/// Plausibility check of a power value against the player's last snapshot.
#[derive(Clone, Copy, Debug)]
pub struct PowerValidator {
    band: f64,
}

impl PowerValidator {
    pub fn new(band: f64) -> Self {
        Self { band }
    }

    /// `(new - prior) / new`. A zero reading never counts as within band.
    pub fn relative_delta(new: u64, prior: u64) -> Option<f64> {
        (new != 0).then(|| (new as f64 - prior as f64) / new as f64)
    }

    pub fn within_band(&self, new: u64, prior: u64) -> bool {
        Self::relative_delta(new, prior).is_some_and(|delta| delta.abs() <= self.band)
    }

    /// `power_text` is the reading as OCR'd; the repair works on its digits.
    pub fn check(&self, power: u64, power_text: &str, prior: Option<u64>) -> PowerCheck {
        let Some(prior) = prior else {
            return PowerCheck::NoBaseline;
        };

        if self.within_band(power, prior) {
            return PowerCheck::Accepted {
                power,
                repaired: false,
            };
        }

        if let Some(repaired) = strip_leading_digit(power_text) {
            if self.within_band(repaired, prior) {
                debug!("Repaired power {} to {} (prior {})", power, repaired, prior);
                return PowerCheck::Accepted {
                    power: repaired,
                    repaired: true,
                };
            }
        }

        debug!("Power {} is implausible against prior {}", power, prior);
        PowerCheck::SuspiciousPowerJump
    }
}

/// OCR sometimes reads an icon as an extra leading digit.
pub fn strip_leading_digit(power_text: &str) -> Option<u64> {
    let digits: String = power_text.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < 2 {
        return None;
    }
    digits[1..].parse().ok()
}
