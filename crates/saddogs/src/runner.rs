use std::fmt::Display;
use std::time::{Duration, Instant};

use futures::StreamExt;
use futures::stream::FuturesUnordered;

use crate::tasks::{Task, TaskContext, TaskError, TaskOutcome};
use crate::types::Record;

#[derive(Debug)]
pub struct TaskReport {
    pub task: &'static str,
    pub result: Result<TaskOutcome, TaskError>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub reports: Vec<TaskReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.result.is_err()).count()
    }

    pub fn unstored(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(&r.result, Ok(outcome) if !outcome.stored))
            .count()
    }

    pub fn records(&self) -> Vec<&Record> {
        self.reports
            .iter()
            .filter_map(|r| r.result.as_ref().ok())
            .map(|outcome| &outcome.record)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

impl Display for RunSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for report in &self.reports {
            match &report.result {
                Ok(outcome) if outcome.stored => {
                    writeln!(f, "  ✔ {:<26} {}", report.task, outcome.record)?
                }
                Ok(outcome) => writeln!(
                    f,
                    "  ! {:<26} {} (not stored)",
                    report.task, outcome.record
                )?,
                Err(e) => writeln!(f, "  ✘ {:<26} {}", report.task, e)?,
            }
        }
        writeln!(f, "\nSummary:")?;
        writeln!(f, "  Tasks run:  {}", self.reports.len())?;
        writeln!(f, "  Failed:     {}", self.failed())?;
        writeln!(f, "  Not stored: {}", self.unstored())?;
        writeln!(f, "  Elapsed:    {:.2}s", self.elapsed.as_secs_f64())
    }
}

/// Runs `tasks` concurrently. A failing task is logged and never stops the others.
///
/// Reports come back in the order the tasks were given.
pub async fn run_tasks(ctx: &TaskContext, tasks: &[&'static Task]) -> RunSummary {
    if tasks.is_empty() {
        log::warn!("No tasks found to run.");
        return RunSummary::default();
    }

    log::info!("Running {} task(s)...", tasks.len());
    let start = Instant::now();

    let mut futs: FuturesUnordered<_> = tasks
        .iter()
        .enumerate()
        .map(|(i, task)| async move {
            log::info!("Starting task: {}", task.name);
            (i, task.name, task.run(ctx).await)
        })
        .collect();

    let mut reports = Vec::with_capacity(tasks.len());
    while let Some((i, name, result)) = futs.next().await {
        match &result {
            Ok(outcome) => log::info!("Task {} finished: {}", name, outcome.record),
            Err(e) => log::error!("Task {} failed: {}", name, e),
        }
        reports.push((
            i,
            TaskReport {
                task: name,
                result,
            },
        ));
    }
    reports.sort_by_key(|(i, _)| *i);

    let elapsed = start.elapsed();
    log::info!("Run completed in {:.2}s.", elapsed.as_secs_f64());

    RunSummary {
        reports: reports.into_iter().map(|(_, report)| report).collect(),
        elapsed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ParseError;
    use crate::store::{MemoryStore, RecordStore};
    use crate::types::RescueRecord;
    use futures::FutureExt;
    use futures::future::BoxFuture;
    use std::sync::Arc;

    fn ok_task(ctx: &TaskContext) -> BoxFuture<'_, Result<TaskOutcome, TaskError>> {
        async move {
            let record = RescueRecord::new(4, "Prueba", "La Gomera");
            ctx.store.insert_rescue(&record).await?;
            Ok(TaskOutcome {
                record: Record::Rescue(record),
                stored: true,
            })
        }
        .boxed()
    }

    fn failing_task(_ctx: &TaskContext) -> BoxFuture<'_, Result<TaskOutcome, TaskError>> {
        async { Err(TaskError::Parse(ParseError::MissingColumn("Perros".into()))) }.boxed()
    }

    static FAILING: Task = Task::new("failing", "always fails", "http://localhost/", failing_task);
    static OK: Task = Task::new("ok", "always succeeds", "http://localhost/", ok_task);

    #[tokio::test]
    async fn test_failure_does_not_stop_other_tasks() {
        let store = Arc::new(MemoryStore::new());
        let ctx = TaskContext::new(store.clone()).unwrap();

        let summary = run_tasks(&ctx, &[&FAILING, &OK]).await;

        assert_eq!(summary.reports.len(), 2);
        assert_eq!(summary.reports[0].task, "failing");
        assert_eq!(summary.reports[1].task, "ok");
        assert_eq!(summary.failed(), 1);
        assert!(!summary.is_success());
        assert_eq!(summary.records().len(), 1);
        assert_eq!(store.fetch_rescues().await.unwrap().len(), 1);

        let text = summary.to_string();
        assert!(text.contains("✘ failing"));
        assert!(text.contains("Column 'Perros' not found"));
        assert!(text.contains("Failed:     1"));
    }

    #[tokio::test]
    async fn test_no_tasks_gives_empty_summary() {
        let ctx = TaskContext::new(Arc::new(MemoryStore::new())).unwrap();
        let summary = run_tasks(&ctx, &[]).await;
        assert!(summary.reports.is_empty());
        assert!(summary.is_success());
    }
}
