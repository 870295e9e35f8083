//! Fleet manager — owns `FleetState` and the cooldown window, and turns
//! backlog samples into capacity changes on the compute platform.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use fleet_core::config::validate_capacity;
use fleet_core::{
    Allocation, BacklogSample, ConfigError, CooldownWindow, FleetSettings, FleetState, FleetStatus,
    LoopPhase, ScalingDecision, Timestamp,
};
use fleetscale_capacity::{allocate, fallback_order};
use fleetscale_metrics::BacklogSource;
use fleetscale_policy::{Evaluation, NoOpReason, StepPolicy};

use crate::error::{FleetError, FleetResult, PlatformError};
use crate::platform::{CapacityOutcome, ComputePlatform};

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No usable sample; nothing evaluated.
    MetricUnavailable,
    /// The policy decided not to scale.
    NoChange(NoOpReason),
    /// The delta was absorbed by the min/max bounds.
    Clamped { size: u32, delta: i32 },
    /// The fleet now runs `to` instances.
    Adjusted { from: u32, to: u32 },
    /// The platform fell short even after fallback placement.
    Partial { from: u32, requested: u32, achieved: u32 },
    /// The platform could not be reached; state untouched.
    Abandoned,
}

/// Owns one fleet and its scaling state.
pub struct FleetManager {
    settings: FleetSettings,
    policy: StepPolicy,
    state: FleetState,
    cooldown: CooldownWindow,
    phase: LoopPhase,
    /// Units per class as last reported by the platform.
    running: Allocation,
    source: Arc<dyn BacklogSource>,
    platform: Arc<dyn ComputePlatform>,
    last_sample_at: Option<Timestamp>,
    last_backlog: Option<f64>,
    last_delta: Option<i32>,
    last_error: Option<String>,
    shortfall: u32,
    ticks: u64,
    status_tx: watch::Sender<FleetStatus>,
}

impl FleetManager {
    /// Build a manager; fails on any configuration problem.
    ///
    /// The fleet starts at `min_instances` with no adjustment on record.
    pub fn new(
        settings: FleetSettings,
        source: Arc<dyn BacklogSource>,
        platform: Arc<dyn ComputePlatform>,
    ) -> Result<Self, ConfigError> {
        if settings.min_instances == 0 {
            return Err(ConfigError::ZeroMinInstances);
        }
        if settings.min_instances > settings.max_instances {
            return Err(ConfigError::InstanceRange {
                min: settings.min_instances,
                max: settings.max_instances,
            });
        }
        validate_capacity(&settings.capacity)?;
        let policy = StepPolicy::new(&settings.steps)?;

        let state = FleetState::new(settings.min_instances, settings.max_instances);
        let cooldown = CooldownWindow::new(settings.cooldown);
        let (status_tx, _) = watch::channel(FleetStatus {
            fleet: settings.name.clone(),
            current_size: state.current_size,
            min_size: state.min_size,
            max_size: state.max_size,
            last_delta: None,
            last_adjustment_at: None,
            last_backlog: None,
            class_units: Allocation::default(),
            shortfall: 0,
            last_error: None,
            phase: LoopPhase::Idle,
            ticks: 0,
        });

        Ok(Self {
            settings,
            policy,
            state,
            cooldown,
            phase: LoopPhase::Idle,
            running: Allocation::default(),
            source,
            platform,
            last_sample_at: None,
            last_backlog: None,
            last_delta: None,
            last_error: None,
            shortfall: 0,
            ticks: 0,
            status_tx,
        })
    }

    pub fn settings(&self) -> &FleetSettings {
        &self.settings
    }

    pub fn policy(&self) -> &StepPolicy {
        &self.policy
    }

    pub fn state(&self) -> FleetState {
        self.state
    }

    pub fn cooldown(&self) -> CooldownWindow {
        self.cooldown
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn running(&self) -> &Allocation {
        &self.running
    }

    /// Current status snapshot.
    pub fn status(&self) -> FleetStatus {
        FleetStatus {
            fleet: self.settings.name.clone(),
            current_size: self.state.current_size,
            min_size: self.state.min_size,
            max_size: self.state.max_size,
            last_delta: self.last_delta,
            last_adjustment_at: self.cooldown.last_adjustment_at,
            last_backlog: self.last_backlog,
            class_units: self.running.clone(),
            shortfall: self.shortfall,
            last_error: self.last_error.clone(),
            phase: self.phase,
            ticks: self.ticks,
        }
    }

    /// Watch status snapshots as the loop publishes them.
    pub fn subscribe(&self) -> watch::Receiver<FleetStatus> {
        self.status_tx.subscribe()
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    fn set_phase(&mut self, phase: LoopPhase) {
        self.phase = phase;
        self.publish();
    }

    /// Bring the platform to the starting size. Cooldown is not touched.
    pub async fn bootstrap(&mut self) -> FleetResult<u32> {
        let target = self.state.current_size;
        let plan = allocate(target, &self.settings.capacity);
        let achieved = self.apply(&plan).await?;
        self.state.current_size = self.state.clamp(i64::from(achieved));
        self.record_shortfall(target, achieved);
        info!(
            fleet = %self.settings.name,
            size = self.state.current_size,
            allocation = ?self.running.classes,
            "fleet bootstrapped"
        );
        self.publish();
        Ok(achieved)
    }

    /// Run one evaluate-and-adjust cycle at time `now`.
    pub async fn tick(&mut self, now: Timestamp) -> TickOutcome {
        self.set_phase(LoopPhase::Evaluating);
        let outcome = self.evaluate_and_adjust(now).await;
        self.ticks += 1;
        self.set_phase(LoopPhase::Idle);
        outcome
    }

    async fn evaluate_and_adjust(&mut self, now: Timestamp) -> TickOutcome {
        let sample = match self.read_sample(now).await {
            Ok(sample) => sample,
            Err(e) => {
                warn!(fleet = %self.settings.name, error = %e, "skipping tick");
                self.last_error = Some(e.to_string());
                return TickOutcome::MetricUnavailable;
            }
        };
        self.last_backlog = Some(sample.value);

        let decision = match self.policy.evaluate(&sample, &self.cooldown, now) {
            Evaluation::Scale(decision) => decision,
            Evaluation::NoOp(reason) => {
                debug!(fleet = %self.settings.name, backlog = sample.value, ?reason, "no scaling");
                return TickOutcome::NoChange(reason);
            }
        };

        self.set_phase(LoopPhase::Adjusting);
        self.adjust(decision).await
    }

    /// Pull a sample and reject anything the policy should not see.
    async fn read_sample(&mut self, now: Timestamp) -> FleetResult<BacklogSample> {
        let source_id = self.settings.source_id.as_str();
        let sample = self
            .source
            .read_backlog(source_id)
            .await
            .map_err(|e| FleetError::MetricUnavailable(e.to_string()))?;

        if !sample.is_valid() {
            return Err(FleetError::MetricUnavailable(format!(
                "invalid backlog value {}",
                sample.value
            )));
        }

        let age = now.saturating_sub(sample.timestamp);
        if age > self.settings.max_sample_age.as_secs() {
            return Err(FleetError::MetricUnavailable(format!(
                "sample is {age}s old"
            )));
        }

        if let Some(last) = self.last_sample_at {
            if sample.timestamp < last {
                return Err(FleetError::MetricUnavailable(format!(
                    "sample at {} predates previous sample at {last}",
                    sample.timestamp
                )));
            }
        }

        self.last_sample_at = Some(sample.timestamp);
        Ok(sample)
    }

    async fn adjust(&mut self, decision: ScalingDecision) -> TickOutcome {
        let from = self.state.current_size;
        let to = self.state.target_for(decision.delta);
        if to == from {
            debug!(
                fleet = %self.settings.name,
                size = from,
                delta = decision.delta,
                "delta clamped to current size"
            );
            return TickOutcome::Clamped {
                size: from,
                delta: decision.delta,
            };
        }

        let plan = allocate(to, &self.settings.capacity);
        let achieved = match self.apply(&plan).await {
            Ok(achieved) => achieved,
            Err(e) => {
                warn!(
                    fleet = %self.settings.name,
                    from,
                    to,
                    error = %e,
                    allocation = ?self.running.classes,
                    "abandoning adjustment"
                );
                self.last_error = Some(FleetError::from(e).to_string());
                return TickOutcome::Abandoned;
            }
        };

        let recorded = self.state.clamp(i64::from(achieved));
        if recorded != from {
            self.state.current_size = recorded;
            self.cooldown.reset(decision.decided_at);
            self.last_delta = Some(decision.delta);
        }
        self.record_shortfall(to, achieved);

        if achieved == to {
            info!(
                fleet = %self.settings.name,
                from,
                to,
                delta = decision.delta,
                allocation = ?self.running.classes,
                "fleet scaled"
            );
            TickOutcome::Adjusted { from, to }
        } else {
            TickOutcome::Partial {
                from,
                requested: to,
                achieved,
            }
        }
    }

    fn record_shortfall(&mut self, requested: u32, achieved: u32) {
        self.shortfall = requested.saturating_sub(achieved);
        if self.shortfall > 0 {
            let err = FleetError::CapacityShortfall {
                requested,
                achieved,
            };
            warn!(fleet = %self.settings.name, error = %err, "partial scaling");
            self.last_error = Some(err.to_string());
        } else {
            self.last_error = None;
        }
    }

    /// Push `plan` to the platform, moving any class's shortfall onto the
    /// other classes in fallback order.
    ///
    /// Every answer from the platform is recorded in `running` as it
    /// arrives, so an unreachable platform part-way through leaves it
    /// matching what was actually set. Returns the total units running.
    async fn apply(&mut self, plan: &Allocation) -> Result<u32, PlatformError> {
        let classes: Vec<String> = self
            .settings
            .capacity
            .iter()
            .map(|c| c.name.clone())
            .collect();
        let mut achieved = vec![0u32; classes.len()];
        let mut missing = vec![0u32; classes.len()];
        let mut exhausted = vec![false; classes.len()];

        for (i, class) in classes.iter().enumerate() {
            let want = plan.units(class);
            let got = self.set_class(class, want).await?;
            achieved[i] = got;
            if got < want {
                missing[i] = want - got;
                exhausted[i] = true;
            }
        }

        for i in 0..classes.len() {
            if missing[i] == 0 {
                continue;
            }
            warn!(
                class = %classes[i],
                missing = missing[i],
                "capacity shortfall, trying fallback classes"
            );

            for j in fallback_order(classes.len(), i) {
                if missing[i] == 0 {
                    break;
                }
                if exhausted[j] {
                    continue;
                }
                let want = achieved[j] + missing[i];
                let got = self.set_class(&classes[j], want).await?;
                let gained = got.saturating_sub(achieved[j]).min(missing[i]);
                achieved[j] = got;
                missing[i] -= gained;
                if got < want {
                    exhausted[j] = true;
                }
                debug!(
                    from_class = %classes[i],
                    to_class = %classes[j],
                    gained,
                    "shortfall moved"
                );
            }

            if missing[i] > 0 {
                warn!(
                    class = %classes[i],
                    unplaced = missing[i],
                    "all capacity classes exhausted"
                );
            }
        }

        Ok(achieved.iter().sum())
    }

    /// Set one class, record the units now running there, and return them.
    async fn set_class(&mut self, class: &str, units: u32) -> Result<u32, PlatformError> {
        let previous = self.running.units(class);
        let got = match self.platform.set_class_capacity(class, units).await {
            Ok(CapacityOutcome::Applied) => units,
            Ok(CapacityOutcome::Partial { achieved }) => {
                debug!(%class, requested = units, achieved, "partial capacity");
                achieved.min(units)
            }
            Ok(CapacityOutcome::Failed) => {
                debug!(%class, requested = units, "capacity request failed");
                previous
            }
            Err(PlatformError::UnknownClass(name)) => {
                warn!(class = %name, "platform does not know capacity class");
                previous
            }
            Err(e) => return Err(e),
        };
        self.running.set(class, got);
        Ok(got)
    }

    /// Tick every `poll_interval` until `shutdown` flips.
    ///
    /// A tick always runs to completion; shutdown is only observed
    /// between ticks.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            fleet = %self.settings.name,
            interval_secs = self.settings.poll_interval.as_secs(),
            cooldown_secs = self.settings.cooldown.as_secs(),
            "fleet manager started"
        );

        let mut interval = tokio::time::interval(self.settings.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; wait one full period for data.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let outcome = self.tick(epoch_secs()).await;
                    debug!(fleet = %self.settings.name, ?outcome, "tick complete");
                }
                _ = shutdown.changed() => {
                    info!(fleet = %self.settings.name, "fleet manager shutting down");
                    break;
                }
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
