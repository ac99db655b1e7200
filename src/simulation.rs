//! Simulation manager
//!
//! The [`Simulator`] owns the model, the resolved [`Settings`], the global
//! time and the [`Logger`]. It validates every block once before the first
//! tick, then advances in fixed steps, calling the model's signal flow once
//! per tick and logging the groups it returns.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::block::Block;
use crate::error::Error;
use crate::logger::{Logger, OutputGroup};
use crate::record::RecordTable;
use crate::settings::{Settings, SettingsOverrides};
use crate::utils::format_duration;

/// One global time increment: `t = t_beg + n * step`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub t: f64,
    pub n: u64,
}

/// A block diagram driven by the simulator
pub trait Model: 'static {
    /// Name shown in the start banner
    fn name(&self) -> &str {
        "model"
    }

    /// Settings the model declares for itself
    fn settings(&self) -> SettingsOverrides {
        SettingsOverrides::default()
    }

    /// Blocks in declaration order; validated in this order before the first tick
    fn blocks_mut(&mut self) -> Vec<&mut dyn Block>;

    /// Compute one tick: read block outputs, call blocks with new inputs and
    /// return the groups to log
    fn signal_flow(&mut self, tick: Tick) -> Result<Vec<OutputGroup>, Error>;
}

/// Simulator status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Model not loaded
    Init,
    /// Loaded, no tick run yet
    Ready,
    /// Validating blocks
    Starting,
    Running,
    RunningUntil,
    Step,
    /// Paused before the end time
    Active,
    Finished,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Init => "init",
            Status::Ready => "ready",
            Status::Starting => "starting",
            Status::Running => "running",
            Status::RunningUntil => "running until",
            Status::Step => "step",
            Status::Active => "active",
            Status::Finished => "finished",
            Status::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run was aborted
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub kind: &'static str,
    pub t: f64,
    pub message: String,
    pub error: Error,
}

impl Failure {
    fn new(error: Error, t: f64) -> Self {
        Self { kind: error.kind(), t, message: error.to_string(), error }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at t={}s: {}", self.kind, self.t, self.message)
    }
}

type Loader<M> = Box<dyn Fn() -> Result<M, Error>>;

/// Fixed-step simulation manager
pub struct Simulator<M: Model> {
    loader: Loader<M>,
    defaults: Settings,
    model: M,
    settings: Settings,
    logger: Logger,
    status: Status,
    t: f64,
    current_step: u64,
    total_steps: u64,
    failure: Option<Failure>,
}

impl<M: Model> Simulator<M> {
    /// Build the model with `loader` and resolve its settings against `defaults`
    ///
    /// The loader is kept so that [`reload`](Self::reload) can rebuild the
    /// model from scratch.
    pub fn load<F>(loader: F, defaults: Settings) -> Result<Self, Error>
    where
        F: Fn() -> Result<M, Error> + 'static,
    {
        let model = loader()?;
        let settings = defaults.resolve(&model.settings());
        settings.validate()?;
        let total_steps = settings.total_steps();
        log::debug!("loaded '{}' with {} steps", model.name(), total_steps);

        Ok(Self {
            loader: Box::new(loader),
            defaults,
            model,
            t: settings.t_beg,
            logger: Logger::new(total_steps as usize),
            settings,
            status: Status::Ready,
            current_step: 0,
            total_steps,
            failure: None,
        })
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Reason the run was aborted, if it was
    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    /// Time of the last completed tick
    pub fn t(&self) -> f64 {
        self.t
    }

    pub fn current_step(&self) -> u64 {
        self.current_step
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Resolved settings of this run
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut M {
        &mut self.model
    }

    /// Rows logged so far
    pub fn data(&self) -> &RecordTable {
        self.logger.table()
    }

    /// Run to `stop_time`, or to the end time when `None`
    ///
    /// A stop time that is not ahead of the current time runs nothing. A
    /// failure inside a tick aborts the run and the rows logged before it
    /// are returned; see [`failure`](Self::failure). Block validation
    /// errors are returned as `Err`.
    pub fn run(&mut self, stop_time: Option<f64>) -> Result<&RecordTable, Error> {
        if !self.can_advance()? {
            return Ok(self.logger.table());
        }
        let started = Instant::now();
        self.start()?;

        let target = match stop_time {
            None => {
                self.status = Status::Running;
                self.total_steps
            }
            Some(stop) => {
                let target = self.step_at(stop).min(self.total_steps);
                if target <= self.current_step {
                    log::info!(
                        "Stop time {}s is not ahead of the current time {}s, nothing to run",
                        stop,
                        self.t
                    );
                    self.status = Status::Active;
                    return Ok(self.logger.table());
                }
                self.status = Status::RunningUntil;
                target
            }
        };

        self.advance(target);
        log::info!(
            "Simulation {} at t={}s after {}",
            self.status,
            self.t,
            format_duration(started.elapsed())
        );
        Ok(self.logger.table())
    }

    /// Advance exactly one tick
    pub fn step(&mut self) -> Result<&RecordTable, Error> {
        if !self.can_advance()? {
            return Ok(self.logger.table());
        }
        let started = Instant::now();
        self.start()?;

        self.status = Status::Step;
        self.advance(self.current_step + 1);
        log::debug!("step {} took {}", self.current_step, format_duration(started.elapsed()));
        Ok(self.logger.table())
    }

    /// Rebuild the model from the original loader and reset the run
    pub fn reload(&mut self) -> Result<(), Error> {
        self.status = Status::Init;
        let model = (self.loader)()?;
        let settings = self.defaults.resolve(&model.settings());
        settings.validate()?;

        self.total_steps = settings.total_steps();
        self.t = settings.t_beg;
        self.logger = Logger::new(self.total_steps as usize);
        self.settings = settings;
        self.model = model;
        self.current_step = 0;
        self.failure = None;
        self.status = Status::Ready;
        log::info!("Reloaded '{}'", self.model.name());
        Ok(())
    }

    /// Guard against running a finished, failed or unloaded simulator
    fn can_advance(&self) -> Result<bool, Error> {
        match self.status {
            Status::Finished => {
                log::info!("Simulation already finished at t={}s, reload the model to run again", self.t);
                Ok(false)
            }
            Status::Failed => {
                log::warn!("Simulation broken, reload the model");
                Ok(false)
            }
            Status::Init => Err(Error::Config("no model loaded".to_string())),
            _ => Ok(true),
        }
    }

    /// Validate every block once, before the first tick
    fn start(&mut self) -> Result<(), Error> {
        if self.status != Status::Ready {
            return Ok(());
        }
        self.status = Status::Starting;
        log::info!(
            "Starting simulation '{}': solver={}, t=[{}, {}]s, step={}s",
            self.model.name(),
            self.settings.solver,
            self.settings.t_beg,
            self.settings.t_end,
            self.settings.sample_time
        );

        let settings = &self.settings;
        let validated = self
            .model
            .blocks_mut()
            .into_iter()
            .try_for_each(|block| block.validate(settings));

        if let Err(err) = validated {
            let err = Error::from(err);
            self.fail(err.clone());
            return Err(err);
        }
        Ok(())
    }

    /// Run ticks `current_step + 1 ..= target`
    fn advance(&mut self, target: u64) {
        for n in self.current_step + 1..=target {
            let t = self.settings.time_at(n);
            self.current_step = n;
            self.t = t;

            let model = &mut self.model;
            let logger = &mut self.logger;
            let tick = Tick { t, n };
            let logged = panic::catch_unwind(AssertUnwindSafe(|| {
                let groups = model.signal_flow(tick)?;
                logger.log(&groups).map_err(Error::from)
            }))
            .unwrap_or_else(|payload| Err(Error::Panic(panic_message(payload))));

            match logged {
                Ok(rows) => log::trace!("tick {}/{} t={}s logged {} rows", n, self.total_steps, t, rows),
                Err(err) => {
                    self.fail(err);
                    return;
                }
            }
        }

        self.status = if self.current_step >= self.total_steps { Status::Finished } else { Status::Active };
    }

    fn fail(&mut self, error: Error) {
        let failure = Failure::new(error, self.t);
        log::error!("Simulation aborted: {}", failure);
        self.failure = Some(failure);
        self.status = Status::Failed;
    }

    /// Tick index closest to time `t`
    fn step_at(&self, t: f64) -> u64 {
        ((t - self.settings.t_beg) / self.settings.sample_time).round().max(0.0) as u64
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
