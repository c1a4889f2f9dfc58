use std::time::Duration;

use tracing::{debug, info};

use crate::config::Variant;
use crate::error::SandboxError;
use crate::sandbox::{Sandbox, SandboxFactory};

/// FPS samples for one (scenario, variant) pair collapsed into summary
/// statistics. `stddev` is the population standard deviation (divide by N);
/// a single repeat therefore aggregates to a stddev of zero.
#[derive(Debug, Clone)]
pub struct AggregatedMetric {
    pub scenario: String,
    pub variant: Variant,
    pub samples: Vec<f64>,
    pub mean: f64,
    pub stddev: f64,
}

impl AggregatedMetric {
    pub fn from_samples(scenario: impl Into<String>, variant: Variant, samples: Vec<f64>) -> Self {
        let count = samples.len().max(1) as f64;
        let mean = samples.iter().sum::<f64>() / count;
        let variance = samples
            .iter()
            .map(|sample| (sample - mean).powi(2))
            .sum::<f64>()
            / count;
        Self {
            scenario: scenario.into(),
            variant,
            samples,
            mean,
            stddev: variance.sqrt(),
        }
    }
}

/// Execute `repeats` independent runs of one (scenario, variant) pair and
/// aggregate the FPS samples.
///
/// Every repeat gets a freshly acquired sandbox that is fully disposed before
/// the next repeat starts, trading wall-clock time for measurement
/// independence. A failed repeat aborts the whole sampling pass; it is never
/// dropped from the average.
pub fn sample<F: SandboxFactory>(
    factory: &F,
    scenario: &str,
    variant: Variant,
    url: &str,
    repeats: u32,
    timeout: Duration,
) -> Result<AggregatedMetric, SandboxError> {
    let repeats = repeats.max(1);
    let mut samples = Vec::with_capacity(repeats as usize);
    for repeat in 0..repeats {
        let mut sandbox = factory.acquire()?;
        let result = sandbox.execute(url, timeout);
        // The instance must be gone before the error propagates or the next
        // repeat launches.
        drop(sandbox);
        let run = result?;
        debug!(scenario, %variant, repeat, fps = run.fps, "collected sample");
        samples.push(run.fps);
    }

    let aggregated = AggregatedMetric::from_samples(scenario, variant, samples);
    info!(
        scenario,
        %variant,
        repeats,
        mean = aggregated.mean,
        stddev = aggregated.stddev,
        "aggregated scenario samples"
    );
    Ok(aggregated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::RunResult;
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    struct ScriptedSandbox {
        fps: Option<f64>,
        disposed: Arc<AtomicBool>,
    }

    impl Sandbox for ScriptedSandbox {
        fn execute(&mut self, url: &str, _timeout: Duration) -> Result<RunResult, SandboxError> {
            match self.fps {
                Some(fps) => Ok(RunResult::from_payload(json!({ "name": "t", "fps": fps }))),
                None => Err(SandboxError::Timeout {
                    url: url.to_string(),
                    waited_ms: 1,
                }),
            }
        }
    }

    impl Drop for ScriptedSandbox {
        fn drop(&mut self) {
            self.disposed.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedFactory {
        script: RefCell<Vec<Option<f64>>>,
        disposal_flags: RefCell<Vec<Arc<AtomicBool>>>,
    }

    impl ScriptedFactory {
        fn new(script: Vec<Option<f64>>) -> Rc<Self> {
            Rc::new(Self {
                script: RefCell::new(script),
                disposal_flags: RefCell::new(Vec::new()),
            })
        }
    }

    impl SandboxFactory for Rc<ScriptedFactory> {
        type Instance = ScriptedSandbox;

        fn acquire(&self) -> Result<ScriptedSandbox, SandboxError> {
            let fps = self.script.borrow_mut().remove(0);
            let disposed = Arc::new(AtomicBool::new(false));
            self.disposal_flags.borrow_mut().push(Arc::clone(&disposed));
            Ok(ScriptedSandbox { fps, disposed })
        }
    }

    #[test]
    fn aggregates_mean_and_population_stddev() {
        let metric = AggregatedMetric::from_samples(
            "cubes",
            Variant::Candidate,
            vec![58.0, 60.0, 62.0],
        );
        assert!((metric.mean - 60.0).abs() < 1e-9);
        let expected = (8.0f64 / 3.0).sqrt();
        assert!((metric.stddev - expected).abs() < 1e-9);
    }

    #[test]
    fn single_repeat_has_zero_stddev() {
        let metric = AggregatedMetric::from_samples("cubes", Variant::Baseline, vec![47.5]);
        assert!((metric.mean - 47.5).abs() < f64::EPSILON);
        assert_eq!(metric.stddev, 0.0);
    }

    #[test]
    fn sample_uses_a_fresh_sandbox_per_repeat() {
        let factory = ScriptedFactory::new(vec![Some(58.0), Some(60.0), Some(62.0)]);
        let metric = sample(
            &factory,
            "cubes",
            Variant::Candidate,
            "http://localhost/cubes/candidate.html",
            3,
            Duration::from_secs(1),
        )
        .expect("sampling");

        assert_eq!(metric.samples, vec![58.0, 60.0, 62.0]);
        assert!((metric.mean - 60.0).abs() < 1e-9);
        let flags = factory.disposal_flags.borrow();
        assert_eq!(flags.len(), 3);
        assert!(flags.iter().all(|flag| flag.load(Ordering::SeqCst)));
    }

    #[test]
    fn failed_repeat_still_disposes_the_sandbox() {
        let factory = ScriptedFactory::new(vec![Some(60.0), None]);
        let err = sample(
            &factory,
            "cubes",
            Variant::Candidate,
            "http://localhost/cubes/candidate.html",
            3,
            Duration::from_secs(1),
        )
        .expect_err("second repeat times out");

        assert!(matches!(err, SandboxError::Timeout { .. }));
        let flags = factory.disposal_flags.borrow();
        // Only two acquisitions happened; both instances were torn down, the
        // failing one included, before the error propagated.
        assert_eq!(flags.len(), 2);
        assert!(flags.iter().all(|flag| flag.load(Ordering::SeqCst)));
    }
}
