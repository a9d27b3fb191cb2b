//! Frame Admission Controller
//!
//! Gates throughput only: decides per arriving frame whether it is
//! processed, dropped or deferred, and whether the pipeline runs in fast
//! mode. Counters are atomics updated once per frame completion.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::AdmissionSettings;
use crate::vision::ClassifierPlan;

/// Device thermal pressure as reported by the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThermalState {
    #[default]
    Nominal,
    Fair,
    Serious,
    Critical,
}

/// Power and thermal signals from the host
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerState {
    pub power_saving: bool,
    pub thermal: ThermalState,
}

impl PowerState {
    /// Whether the reduced frame rate applies
    pub fn is_constrained(&self) -> bool {
        self.power_saving || self.thermal >= ThermalState::Serious
    }
}

/// Processing instructions for an admitted frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmittedFrame {
    /// Use cheaper recognition parameters
    pub fast_mode: bool,
    /// Classifiers allowed for this frame
    pub plan: ClassifierPlan,
}

/// Verdict for one arriving frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionVerdict {
    Process(AdmittedFrame),
    /// Arrived too soon after the last admitted frame
    Drop,
    /// Too many frames in flight; may be offered again later
    Defer,
}

const NO_SAMPLE: u64 = u64::MAX;

/// Throughput gate shared by the frame source and the workers
pub struct AdmissionController {
    settings: AdmissionSettings,
    in_flight: AtomicUsize,
    /// Smoothed latency in microseconds, `NO_SAMPLE` until the first completion
    avg_latency_us: AtomicU64,
    fast_mode: AtomicBool,
    constrained: AtomicBool,
    power: Mutex<PowerState>,
    last_admitted: Mutex<Option<Instant>>,
}

impl AdmissionController {
    /// Create a new admission controller
    pub fn new(settings: AdmissionSettings) -> Self {
        Self {
            settings,
            in_flight: AtomicUsize::new(0),
            avg_latency_us: AtomicU64::new(NO_SAMPLE),
            fast_mode: AtomicBool::new(false),
            constrained: AtomicBool::new(false),
            power: Mutex::new(PowerState::default()),
            last_admitted: Mutex::new(None),
        }
    }

    /// Decide what happens to a frame arriving at `now`
    pub fn admit(&self, now: Instant) -> AdmissionVerdict {
        let constrained = self.constrained.load(Ordering::Acquire);
        let fps = if constrained {
            self.settings.power_saving_fps
        } else {
            self.settings.target_fps
        };
        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);

        let mut last = self.last_admitted.lock();
        if let Some(prev) = *last {
            if now.saturating_duration_since(prev) < interval {
                return AdmissionVerdict::Drop;
            }
        }

        if self.in_flight.load(Ordering::Acquire) >= self.settings.max_in_flight {
            return AdmissionVerdict::Defer;
        }

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        *last = Some(now);
        drop(last);

        let fast_mode = self.update_fast_mode();
        let plan = ClassifierPlan {
            surface: true,
            lighting: !constrained,
            angle: !(constrained || fast_mode),
        };
        AdmissionVerdict::Process(AdmittedFrame { fast_mode, plan })
    }

    /// Record the completion of an admitted frame
    pub fn complete(&self, latency: Duration) {
        let _ = self
            .in_flight
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |d| Some(d.saturating_sub(1)));

        let sample = latency.as_micros().min(u64::MAX as u128 - 1) as u64;
        let alpha = self.settings.latency_smoothing as f64;
        let _ = self
            .avg_latency_us
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |prev| {
                if prev == NO_SAMPLE {
                    Some(sample)
                } else {
                    let next = prev as f64 + alpha * (sample as f64 - prev as f64);
                    Some(next.round().max(0.0) as u64)
                }
            });

        self.update_fast_mode();
    }

    /// Apply new power/thermal signals; takes effect on the next frame
    pub fn set_power_state(&self, state: PowerState) {
        let mut power = self.power.lock();
        if *power != state {
            info!("Power state changed: {:?} -> {:?}", *power, state);
        }
        *power = state;
        self.constrained.store(state.is_constrained(), Ordering::Release);
    }

    /// Get the last reported power state
    pub fn power_state(&self) -> PowerState {
        *self.power.lock()
    }

    /// Get the number of admitted frames not yet completed
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Get the smoothed frame latency, if any frame has completed
    pub fn average_latency(&self) -> Option<Duration> {
        match self.avg_latency_us.load(Ordering::Acquire) {
            NO_SAMPLE => None,
            us => Some(Duration::from_micros(us)),
        }
    }

    /// Check if fast mode is on
    pub fn is_fast_mode(&self) -> bool {
        self.fast_mode.load(Ordering::Acquire)
    }

    /// Re-evaluate fast mode with hysteresis between the water marks
    fn update_fast_mode(&self) -> bool {
        let depth = self.in_flight();
        let avg_ms = self
            .average_latency()
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        let s = &self.settings;

        let current = self.is_fast_mode();
        let next = if current {
            !(avg_ms < s.latency_low_water_ms as f64 && depth <= s.depth_low_water)
        } else {
            avg_ms > s.latency_high_water_ms as f64 || depth > s.depth_high_water
        };

        if next != current
            && self
                .fast_mode
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
        {
            debug!(
                "Fast mode {} (avg {:.1}ms, depth {})",
                if next { "on" } else { "off" },
                avg_ms,
                depth
            );
        }
        self.is_fast_mode()
    }
}
