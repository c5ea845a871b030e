//! Device-side glue: turns a device model into a problem part per cycle and
//! keeps the plan the coordinator chose for it.

use std::sync::Arc;

use tracing::debug;

use super::registry::DeviceSchedule;
use crate::devices::{DeviceModel, PlanningContext};
use crate::error::{ConfigError, ProblemPartError};
use crate::problem::{DeviceId, ProblemPart};

/// A device taking part in scheduling.
pub trait DeviceController: Send {
    fn device_id(&self) -> &DeviceId;

    /// Builds this cycle's problem part from the device's current state.
    ///
    /// # Errors
    ///
    /// Returns a `ProblemPartError` if the device cannot describe itself
    /// for the given window.
    fn problem_part(&mut self, ctx: &PlanningContext) -> Result<ProblemPart, ProblemPartError>;

    /// Receives the plan published for this device.
    fn accept(&mut self, plan: Arc<DeviceSchedule>);

    /// The plan still pending, re-based to the last planning time.
    fn current_plan(&self) -> Option<&DeviceSchedule>;
}

/// Controller backed by a [`DeviceModel`].
///
/// Before each cycle the model is advanced along the previously accepted
/// plan up to the new reference time; only the remainder of that plan is
/// kept afterwards.
#[derive(Debug)]
pub struct ModelController {
    id: DeviceId,
    model: Box<dyn DeviceModel>,
    plan: Option<DeviceSchedule>,
}

impl ModelController {
    pub fn new(model: Box<dyn DeviceModel>) -> Self {
        Self {
            id: DeviceId::new(model.id()),
            model,
            plan: None,
        }
    }

    /// Validates the model before wrapping it.
    ///
    /// # Errors
    ///
    /// Returns every parameter violation, with field paths under `prefix`.
    pub fn validated(model: Box<dyn DeviceModel>, prefix: &str) -> Result<Self, Vec<ConfigError>> {
        let errors = model.validate(prefix);
        if errors.is_empty() {
            Ok(Self::new(model))
        } else {
            Err(errors)
        }
    }

    pub fn model(&self) -> &dyn DeviceModel {
        self.model.as_ref()
    }

    fn catch_up(&mut self, now: i64) {
        let Some(plan) = self.plan.take() else {
            return;
        };
        if now > plan.reference_time {
            self.model
                .advance(&plan.decisions, &plan.schedule, plan.reference_time, now);
            debug!(device = %self.id, from = plan.reference_time, to = now, "device advanced along plan");
            self.plan = Some(plan.remaining_after(now));
        } else {
            self.plan = Some(plan);
        }
    }
}

impl DeviceController for ModelController {
    fn device_id(&self) -> &DeviceId {
        &self.id
    }

    fn problem_part(&mut self, ctx: &PlanningContext) -> Result<ProblemPart, ProblemPartError> {
        self.catch_up(ctx.reference_time);
        let strategy = self.model.strategy(ctx)?;
        ProblemPart::new(self.id.clone(), ctx.reference_time, ctx.horizon, strategy)
    }

    fn accept(&mut self, plan: Arc<DeviceSchedule>) {
        self.plan = Some(DeviceSchedule::clone(&plan));
    }

    fn current_plan(&self) -> Option<&DeviceSchedule> {
        self.plan.as_ref()
    }
}
