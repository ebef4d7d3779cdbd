//! The entropy report loop.
//!
//! Forever: wait a Poisson-distributed interval, draw a fresh value, publish
//! it over a single secure session, repeat. The loop blocks on its own
//! publish, so a new value is never drawn while a session is open.

use crate::entropy::EntropyValue;
use crate::interval::PoissonInterval;
use crate::platform::NodeContext;
use crate::session::{self, SessionError, SessionOutcome};
use std::convert::Infallible;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReportError {
    /// A fatal session error has already requested a restart.
    #[error("process restart requested after a fatal session error")]
    RestartRequested,
}

/// What happened in one cycle, when the loop carries on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Delivered,
    /// The session dropped before acknowledgment.
    Dropped,
    /// The session could not be built, started or used; retried next cycle.
    Abandoned(SessionError),
}

pub struct ReportLoop {
    ctx: NodeContext,
    interval: PoissonInterval,
    cycle: u64,
}

impl ReportLoop {
    pub fn new(ctx: NodeContext, interval: PoissonInterval) -> Self {
        Self {
            ctx,
            interval,
            cycle: 0,
        }
    }

    pub fn cycles(&self) -> u64 {
        self.cycle
    }

    /// Run until a fatal session error. Only ever returns an error.
    pub async fn run(mut self) -> Result<Infallible, ReportError> {
        info!("report: GENERATING ENTROPY... PATIENCE IS ADVISED");
        loop {
            match self.run_cycle().await? {
                CycleOutcome::Delivered => info!("report: cycle {} delivered", self.cycle),
                CycleOutcome::Dropped => warn!("report: cycle {} dropped, will retry", self.cycle),
                CycleOutcome::Abandoned(e) => warn!("report: cycle {} abandoned: {}", self.cycle, e),
            }
            info!("report: GENERATING SOME MORE ENTROPY... PATIENCE IS ADVISED");
        }
    }

    /// One wait-draw-publish round.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, ReportError> {
        self.cycle += 1;

        let wait = self.interval.sample(&*self.ctx.random);
        debug!("report: cycle {} sleeping {:.1} min", self.cycle, wait.as_secs_f64() / 60.0);
        tokio::time::sleep(wait).await;

        let value = EntropyValue::draw(&*self.ctx.random);
        info!("report: cycle {} entropy generated", self.cycle);

        match session::publish(&self.ctx, value.into_body()).await {
            Ok(SessionOutcome::Acknowledged) => Ok(CycleOutcome::Delivered),
            Ok(SessionOutcome::Disconnected) => Ok(CycleOutcome::Dropped),
            Err(e) if e.is_fatal() => Err(ReportError::RestartRequested),
            Err(e) => Ok(CycleOutcome::Abandoned(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{test_context, SessionScript, SimHandles};
    use std::time::Duration;

    fn report_loop(ctx: NodeContext) -> ReportLoop {
        let interval = PoissonInterval::new(ctx.config.mean_interval_minutes).unwrap();
        ReportLoop::new(ctx, interval)
    }

    fn scripted(
        words: impl IntoIterator<Item = u32>,
        scripts: impl IntoIterator<Item = SessionScript>,
    ) -> (NodeContext, SimHandles) {
        let (mut ctx, sim) = test_context(scripts);
        ctx.random = std::sync::Arc::new(crate::sim::ScriptedRandom::new(words));
        (ctx, sim)
    }

    #[tokio::test(start_paused = true)]
    async fn cycle_waits_the_sampled_interval_before_publishing() {
        // -60 * ln(0.5) minutes ~ 41.6 min
        let half = u32::MAX / 2;
        let (ctx, sim) = scripted([half, 0, 7], [SessionScript::Acknowledge]);
        let mut looped = report_loop(ctx);

        let start = tokio::time::Instant::now();
        assert_eq!(looped.run_cycle().await, Ok(CycleOutcome::Delivered));
        let waited = start.elapsed();

        let expected = Duration::from_secs_f64(-60.0 * 60.0 * 0.5f64.ln());
        assert!(waited >= expected, "{waited:?} < {expected:?}");
        assert!(waited < expected + Duration::from_secs(2), "{waited:?}");
        assert_eq!(sim.transport.log().delivered, vec![7]);
    }

    #[tokio::test(start_paused = true)]
    async fn each_value_goes_only_to_its_own_session() {
        let words = [
            1, 0xA, 0x1, // cycle 1
            1, 0xB, 0x2, // cycle 2, session drops
            1, 0xC, 0x3, // cycle 3
        ];
        let scripts = [
            SessionScript::Acknowledge,
            SessionScript::DisconnectBeforePublish,
            SessionScript::Acknowledge,
        ];
        let (ctx, sim) = scripted(words, scripts);
        let mut looped = report_loop(ctx);

        assert_eq!(looped.run_cycle().await, Ok(CycleOutcome::Delivered));
        assert_eq!(looped.run_cycle().await, Ok(CycleOutcome::Dropped));
        assert_eq!(looped.run_cycle().await, Ok(CycleOutcome::Delivered));

        let log = sim.transport.log();
        assert_eq!(log.opened, 3);
        assert_eq!(log.destroyed, 3);
        assert_eq!(log.delivered, vec![(0xA << 32) | 0x1, (0xC << 32) | 0x3]);
        assert_eq!(looped.cycles(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_attempts_are_retried_next_cycle() {
        let (ctx, sim) = test_context([SessionScript::FailOpen, SessionScript::FailStart, SessionScript::Acknowledge]);
        let mut looped = report_loop(ctx);

        assert!(matches!(
            looped.run_cycle().await,
            Ok(CycleOutcome::Abandoned(SessionError::Construct(_)))
        ));
        assert!(matches!(
            looped.run_cycle().await,
            Ok(CycleOutcome::Abandoned(SessionError::Start(_)))
        ));
        assert_eq!(looped.run_cycle().await, Ok(CycleOutcome::Delivered));
        assert_eq!(sim.restart.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn protocol_error_ends_the_loop_after_one_restart() {
        let (ctx, sim) = test_context([
            SessionScript::Acknowledge,
            SessionScript::DisconnectBeforePublish,
            SessionScript::ProtocolErrorOnConnect,
            SessionScript::Acknowledge,
        ]);

        let result = report_loop(ctx).run().await;

        assert_eq!(result.unwrap_err(), ReportError::RestartRequested);
        assert_eq!(sim.restart.count(), 1);
        // the fourth script is never reached
        assert_eq!(sim.transport.log().opened, 3);
    }
}
