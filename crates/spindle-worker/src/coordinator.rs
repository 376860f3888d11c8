//! Drives one run of both workers under either coordination model
//!
//! Both models follow the same order: check preconditions, start both
//! workers, count down, cancel the series, wait for the series, then poll
//! the survey until it finishes on its own.

use crate::handle::WorkerHandle;
use crate::jobs::{
    SeriesResult, SeriesWorker, SurveyResult, SurveyWorker, SERIES_WORKER, SURVEY_WORKER,
};
use crate::pool::WorkerPool;
use crate::report::{Model, Reporter, RunReport};
use spindle_core::{Error, Outcome, Result, SignalManager, SpindleConfig, WorkerFailure};
use spindle_telemetry::LoggingSnapshot;
use std::time::Instant;
use tracing::{info, warn};

/// Runs the series and survey workers end to end
#[derive(Debug, Clone)]
pub struct Coordinator {
    config: SpindleConfig,
    logging: LoggingSnapshot,
}

impl Coordinator {
    /// Validate `config` and capture the logging snapshot workers re-attach
    pub fn new(config: SpindleConfig) -> Result<Self> {
        config.validate()?;
        let logging = config.logging.snapshot()?;
        Ok(Self { config, logging })
    }

    /// Run configuration
    pub fn config(&self) -> &SpindleConfig {
        &self.config
    }

    /// Run once with the given model
    pub async fn run(&self, model: Model, reporter: &dyn Reporter) -> Result<RunReport> {
        match model {
            Model::Handles => self.run_handles(reporter).await,
            Model::Pool => self.run_pool(reporter).await,
        }
    }

    /// One dedicated thread per worker, joined explicitly
    pub async fn run_handles(&self, reporter: &dyn Reporter) -> Result<RunReport> {
        let start = Instant::now();
        let (series_worker, survey_worker) = self.prepare()?;
        reporter.started(Model::Handles);
        info!("Starting handles run over {}", survey_worker.root().display());

        let mut series = WorkerHandle::new(SERIES_WORKER, true, move |ctx| {
            Ok(series_worker.run(ctx.cancellation()?))
        })
        .with_logging(self.logging.clone());
        let mut survey = WorkerHandle::new(SURVEY_WORKER, false, move |_| survey_worker.run())
            .with_logging(self.logging.clone());

        series.start()?;
        if let Err(e) = survey.start() {
            warn!("Survey worker did not start, stopping series: {}", e);
            series.request_cancel()?;
            series.join(None).await?;
            return Err(e);
        }

        self.countdown(reporter).await;

        series.request_cancel()?;
        series.join(None).await?;

        let poll = self.config.coordinator.poll_interval();
        while survey.is_alive() {
            reporter.waiting(survey.name(), start.elapsed());
            survey.join(Some(poll)).await?;
        }
        survey.join(None).await?;

        let series = series.outcome().await?.clone();
        reporter.series(&series);
        let survey = survey.outcome().await?.clone();
        reporter.survey(&survey);

        Ok(self.finish(Model::Handles, series, survey, start, reporter))
    }

    /// Both workers submitted to one pool, with a managed cancellation signal
    pub async fn run_pool(&self, reporter: &dyn Reporter) -> Result<RunReport> {
        let start = Instant::now();
        let (series_worker, survey_worker) = self.prepare()?;
        reporter.started(Model::Pool);
        info!("Starting pool run over {}", survey_worker.root().display());

        let mut pool = WorkerPool::from_config(&self.config.pool)?
            .with_logging(self.logging.clone());

        // declared after the pool so an abandoned run releases the series
        // before the pool's drop joins its threads
        let manager = SignalManager::new();
        manager.start();
        let signal = manager.signal()?;

        let series = pool.submit_cancellable(SERIES_WORKER, signal.clone(), move |ctx| {
            Ok(series_worker.run(ctx.cancellation()?))
        })?;
        let survey = match pool.submit(SURVEY_WORKER, move |_| survey_worker.run()) {
            Ok(future) => future,
            Err(e) => {
                warn!("Survey task was not accepted, stopping series: {}", e);
                manager.shutdown();
                pool.shutdown().await?;
                return Err(e);
            }
        };

        self.countdown(reporter).await;

        signal.cancel();
        let series = into_outcome(series.get(None).await)?;
        reporter.series(&series);

        let poll = self.config.coordinator.poll_interval();
        let survey = loop {
            match survey.get(Some(poll)).await {
                Err(e) if e.is_timeout() => reporter.waiting(survey.name(), start.elapsed()),
                result => break into_outcome(result)?,
            }
        };
        reporter.survey(&survey);

        pool.shutdown().await?;
        manager.shutdown();

        Ok(self.finish(Model::Pool, series, survey, start, reporter))
    }

    /// Build both payloads; any failure here aborts before a worker exists
    fn prepare(&self) -> Result<(SeriesWorker, SurveyWorker)> {
        let series = SeriesWorker::new(self.config.series.clone())?;
        let survey = SurveyWorker::new(&self.config.survey)?;
        Ok((series, survey))
    }

    async fn countdown(&self, reporter: &dyn Reporter) {
        let tick = self.config.coordinator.countdown_tick();
        for remaining in (0..=self.config.coordinator.countdown).rev() {
            reporter.countdown(remaining);
            tokio::time::sleep(tick).await;
        }
    }

    fn finish(
        &self,
        model: Model,
        series: Outcome<SeriesResult>,
        survey: Outcome<SurveyResult>,
        start: Instant,
        reporter: &dyn Reporter,
    ) -> RunReport {
        let report = RunReport {
            model,
            series,
            survey,
            elapsed: start.elapsed(),
        };
        info!(
            "Finished {} run in {:?} (success: {})",
            model,
            report.elapsed,
            report.is_success()
        );
        reporter.finished(&report);
        report
    }
}

/// Keep worker failures as data; anything else is a coordinator error
fn into_outcome<T>(result: Result<T>) -> Result<Outcome<T>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(Error::WorkerFailed { worker, message }) => Ok(Err(WorkerFailure { worker, message })),
        Err(e) => Err(e),
    }
}
