use std::time::Duration;

use rand::Rng;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("minimum delay {min:?} is larger than maximum delay {max:?}")]
pub struct InvalidPacing {
    pub min: Duration,
    pub max: Duration,
}

/// Delay inserted between two records of a batch so the satellite does not
/// receive bursts of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pacing {
    None,
    Fixed(Duration),
    Jitter { min: Duration, max: Duration },
}

impl Default for Pacing {
    fn default() -> Self {
        Self::Jitter {
            min: Duration::from_millis(500),
            max: Duration::from_millis(1500),
        }
    }
}

impl Pacing {
    pub fn jitter(min: Duration, max: Duration) -> Result<Self, InvalidPacing> {
        if min > max {
            return Err(InvalidPacing { min, max });
        }

        Ok(Self::Jitter { min, max })
    }

    pub fn next_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        match *self {
            Pacing::None => Duration::ZERO,
            Pacing::Fixed(delay) => delay,
            Pacing::Jitter { min, max } if min >= max => min,
            Pacing::Jitter { min, max } => {
                let millis = rng.gen_range(min.as_millis()..=max.as_millis());
                Duration::from_millis(millis as u64)
            }
        }
    }

    pub async fn wait(&self) {
        let delay = self.next_delay(&mut rand::thread_rng());
        if delay.is_zero() {
            return;
        }

        tracing::debug!("Waiting {} before next record", humantime::format_duration(delay));
        tokio::time::sleep(delay).await;
    }
}
