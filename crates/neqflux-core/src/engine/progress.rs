/// Events emitted while a workflow runs.
///
/// Phases bracket coarse steps (a frequency, a transform sweep); tasks count fine-grained
/// work inside a phase so that a front end can draw a bar.
#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    /// A flux evaluation finished; `cached` is set when it was served from the record file.
    FrequencyDone { omega: f64, cached: bool },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    pub fn message(&self, text: impl Into<String>) {
        self.report(Progress::Message(text.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn events_reach_the_callback_in_order() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            let label = match event {
                Progress::PhaseStart { name } => name.to_string(),
                Progress::FrequencyDone { cached, .. } => format!("done:{}", cached),
                Progress::Message(m) => m,
                _ => "other".to_string(),
            };
            seen.lock().unwrap().push(label);
        }));
        reporter.report(Progress::PhaseStart { name: "Flux" });
        reporter.report(Progress::FrequencyDone { omega: 0.1, cached: true });
        reporter.message("hello");
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec!["Flux", "done:true", "hello"]);
    }

    #[test]
    fn silent_reporter_ignores_events() {
        ProgressReporter::new().report(Progress::TaskIncrement);
    }
}
