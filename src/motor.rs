//! Motor Driver: the fan/damper hardware boundary.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Retries before a not-yet-initialized driver call is treated as fatal.
pub const MOTOR_RETRY_ATTEMPTS: u32 = 5;
/// Delay between retry attempts.
pub const MOTOR_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Hardware boundary for the blower fan and intake damper. Production
/// wiring (I²C to a PCA9685 or similar PWM expander) is out of scope; this
/// trait is the seam a real driver plugs into.
#[async_trait]
pub trait MotorDriver: Send + Sync {
    /// Drive the blower fan. `0` is a literal stop; non-zero maps through
    /// the driver's internal PWM curve. `reversed` flips polarity for
    /// blowers wired to spin backwards.
    async fn set_fan(&self, speed_pct: u8, reversed: bool) -> Result<()>;

    /// Position the intake damper/servo. `0` = closed, `100` = open.
    async fn set_damper(&self, position_pct: u8) -> Result<()>;

    /// Whether the underlying hardware has finished initializing.
    fn initialized(&self) -> bool;
}

/// A `MotorDriver` that logs calls and never touches hardware. Used as the
/// default in the CLI binary until a real I²C backend is wired in.
#[derive(Debug, Default)]
pub struct NullMotorDriver;

#[async_trait]
impl MotorDriver for NullMotorDriver {
    async fn set_fan(&self, speed_pct: u8, reversed: bool) -> Result<()> {
        debug!(speed_pct, reversed, "null motor driver: set_fan");
        Ok(())
    }

    async fn set_damper(&self, position_pct: u8) -> Result<()> {
        debug!(position_pct, "null motor driver: set_damper");
        Ok(())
    }

    fn initialized(&self) -> bool {
        true
    }
}

/// Wraps any `MotorDriver`, retrying calls made before `initialized()`
/// returns true instead of failing immediately.
pub struct RetryingMotorDriver<D> {
    inner: D,
    retry_count: AtomicU32,
}

impl<D: MotorDriver> RetryingMotorDriver<D> {
    /// Wrap `inner`.
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            retry_count: AtomicU32::new(0),
        }
    }

    async fn wait_for_ready(&self) -> Result<()> {
        if self.inner.initialized() {
            return Ok(());
        }
        for attempt in 1..=MOTOR_RETRY_ATTEMPTS {
            tokio::time::sleep(MOTOR_RETRY_DELAY).await;
            if self.inner.initialized() {
                return Ok(());
            }
            warn!(attempt, "motor driver not yet initialized, retrying");
        }
        self.retry_count.fetch_add(1, Ordering::SeqCst);
        Err(Error::MotorDriverNotReady {
            attempts: MOTOR_RETRY_ATTEMPTS,
        })
    }
}

#[async_trait]
impl<D: MotorDriver> MotorDriver for RetryingMotorDriver<D> {
    async fn set_fan(&self, speed_pct: u8, reversed: bool) -> Result<()> {
        self.wait_for_ready().await?;
        self.inner.set_fan(speed_pct, reversed).await
    }

    async fn set_damper(&self, position_pct: u8) -> Result<()> {
        self.wait_for_ready().await?;
        self.inner.set_damper(position_pct).await
    }

    fn initialized(&self) -> bool {
        self.inner.initialized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct FlakyDriver {
        ready: AtomicBool,
    }

    #[async_trait]
    impl MotorDriver for FlakyDriver {
        async fn set_fan(&self, _speed_pct: u8, _reversed: bool) -> Result<()> {
            Ok(())
        }
        async fn set_damper(&self, _position_pct: u8) -> Result<()> {
            Ok(())
        }
        fn initialized(&self) -> bool {
            self.ready.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn test_null_driver_always_succeeds() {
        let driver = NullMotorDriver;
        assert!(driver.set_fan(50, false).await.is_ok());
        assert!(driver.set_damper(50).await.is_ok());
        assert!(driver.initialized());
    }

    #[tokio::test]
    async fn test_retrying_driver_succeeds_once_ready() {
        let driver = RetryingMotorDriver::new(FlakyDriver {
            ready: AtomicBool::new(true),
        });
        assert!(driver.set_fan(50, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_retrying_driver_fails_after_exhausting_retries() {
        let driver = RetryingMotorDriver::new(FlakyDriver {
            ready: AtomicBool::new(false),
        });
        let err = driver.set_fan(50, false).await.unwrap_err();
        assert!(matches!(err, Error::MotorDriverNotReady { attempts } if attempts == MOTOR_RETRY_ATTEMPTS));
    }
}
