//! Background worker running quality tests and emitting report documents.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use crate::error::{DqmError, Result};
use crate::manager::MonitorElementManager;
use crate::output::Output;
use crate::report::{ReportDocument, ReportStorage};

/// Shares a [`MonitorElementManager`] with a worker task.
///
/// Booking and attaching go through [`QualityService::manager`]; runs are
/// requested through the [`ServiceHandle`] returned by
/// [`QualityService::start`] or done inline with [`QualityService::run_now`].
/// Every bulk run is emitted to all configured outputs.
///
/// # Example
///
/// ```rust,no_run
/// use dqmwatch_core::{MonitorElementManager, Output, QualityService};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let service = QualityService::builder()
///         .manager(MonitorElementManager::new())
///         .output(Output::file("qreports.json"))
///         .interval(Duration::from_secs(30))
///         .build();
///
///     let handle = service.start();
///     let document = handle.run_all().await.unwrap();
///     println!("{} report(s)", document.qreports.len());
///     handle.stop();
/// }
/// ```
#[derive(Debug)]
pub struct QualityService {
    manager: Arc<RwLock<MonitorElementManager>>,
    outputs: Arc<Vec<Output>>,
    interval: Option<Duration>,
}

impl QualityService {
    pub fn new(manager: MonitorElementManager) -> Self {
        Self::builder().manager(manager).build()
    }

    pub fn builder() -> QualityServiceBuilder {
        QualityServiceBuilder::new()
    }

    /// The shared manager.
    pub fn manager(&self) -> Arc<RwLock<MonitorElementManager>> {
        self.manager.clone()
    }

    /// Run every attached test now and emit the result.
    pub async fn run_now(&self) -> Result<ReportDocument> {
        run_all(&self.manager, &self.outputs).await
    }

    /// Spawn the worker task.
    ///
    /// With an interval configured, the worker also runs every test on each
    /// tick.
    pub fn start(&self) -> ServiceHandle {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (request_tx, mut request_rx) = mpsc::channel::<Request>(64);
        let manager = self.manager.clone();
        let outputs = self.outputs.clone();
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = interval.map(tokio::time::interval);

            loop {
                tokio::select! {
                    Some(request) = request_rx.recv() => {
                        handle_request(&manager, &outputs, request).await;
                    }
                    _ = tick(&mut ticker) => {
                        if let Err(err) = run_all(&manager, &outputs).await {
                            warn!("Scheduled quality test run failed: {}", err);
                        }
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Quality service stopped");
        });

        ServiceHandle {
            requests: request_tx,
            stop_tx,
        }
    }
}

/// Builder for a [`QualityService`].
#[derive(Debug, Default)]
pub struct QualityServiceBuilder {
    manager: Option<MonitorElementManager>,
    outputs: Vec<Output>,
    interval: Option<Duration>,
}

impl QualityServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager to share. Defaults to an empty one with the built-in types.
    pub fn manager(mut self, manager: MonitorElementManager) -> Self {
        self.manager = Some(manager);
        self
    }

    /// Add an output destination.
    pub fn output(mut self, output: Output) -> Self {
        self.outputs.push(output);
        self
    }

    /// Run every test periodically.
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn build(self) -> QualityService {
        QualityService {
            manager: Arc::new(RwLock::new(self.manager.unwrap_or_default())),
            outputs: Arc::new(self.outputs),
            interval: self.interval,
        }
    }
}

enum Request {
    Test {
        path: String,
        name: String,
        qtest: String,
        reply: oneshot::Sender<Result<ReportStorage>>,
    },
    Element {
        path: String,
        name: String,
        reply: oneshot::Sender<Result<ReportStorage>>,
    },
    All {
        reply: oneshot::Sender<Result<ReportDocument>>,
    },
}

/// Handle to a running [`QualityService`] worker.
#[derive(Debug)]
pub struct ServiceHandle {
    requests: mpsc::Sender<Request>,
    stop_tx: watch::Sender<bool>,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::Test { path, name, qtest, .. } => write!(f, "Test({path}/{name}, {qtest})"),
            Request::Element { path, name, .. } => write!(f, "Element({path}/{name})"),
            Request::All { .. } => f.write_str("All"),
        }
    }
}

impl ServiceHandle {
    async fn call<T>(&self, request: Request, reply: oneshot::Receiver<Result<T>>) -> Result<T> {
        self.requests
            .send(request)
            .await
            .map_err(|_| DqmError::NotInitialized("quality service is not running".into()))?;
        reply
            .await
            .map_err(|_| DqmError::Failure("quality service dropped the request".into()))?
    }

    /// Run the attached test `qtest` on element `path`/`name`.
    pub async fn run_quality_test(&self, path: &str, name: &str, qtest: &str) -> Result<ReportStorage> {
        let (reply, rx) = oneshot::channel();
        let request = Request::Test {
            path: path.to_string(),
            name: name.to_string(),
            qtest: qtest.to_string(),
            reply,
        };
        self.call(request, rx).await
    }

    /// Run every test attached to element `path`/`name`.
    pub async fn run_element(&self, path: &str, name: &str) -> Result<ReportStorage> {
        let (reply, rx) = oneshot::channel();
        let request = Request::Element {
            path: path.to_string(),
            name: name.to_string(),
            reply,
        };
        self.call(request, rx).await
    }

    /// Run every attached test and emit the resulting document.
    pub async fn run_all(&self) -> Result<ReportDocument> {
        let (reply, rx) = oneshot::channel();
        self.call(Request::All { reply }, rx).await
    }

    /// Stop the worker.
    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Run `f` against the manager on the blocking pool.
async fn with_manager<T, F>(manager: &Arc<RwLock<MonitorElementManager>>, f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&MonitorElementManager) -> Result<T> + Send + 'static,
{
    let manager = manager.clone();
    tokio::task::spawn_blocking(move || f(&manager.read()))
        .await
        .map_err(|err| DqmError::Failure(format!("quality test worker failed: {err}")))?
}

async fn run_all(manager: &Arc<RwLock<MonitorElementManager>>, outputs: &[Output]) -> Result<ReportDocument> {
    let document = with_manager(manager, |manager| {
        let mut reports = ReportStorage::new();
        manager.run_quality_tests(&mut reports)?;
        Ok(ReportDocument::new(&reports))
    })
    .await?;

    for output in outputs {
        if let Err(err) = output.emit(&document).await {
            warn!("Failed to emit quality reports to {:?}: {}", output, err);
        }
    }
    Ok(document)
}

async fn handle_request(manager: &Arc<RwLock<MonitorElementManager>>, outputs: &[Output], request: Request) {
    debug!("Handling {:?}", request);
    match request {
        Request::Test {
            path,
            name,
            qtest,
            reply,
        } => {
            let result = with_manager(manager, move |manager| {
                let mut reports = ReportStorage::new();
                manager.run_quality_test(&path, &name, &qtest, &mut reports)?;
                Ok(reports)
            })
            .await;
            let _ = reply.send(result);
        }
        Request::Element { path, name, reply } => {
            let result = with_manager(manager, move |manager| {
                let mut reports = ReportStorage::new();
                manager.run_quality_tests_for(&path, &name, &mut reports)?;
                Ok(reports)
            })
            .await;
            let _ = reply.send(result);
        }
        Request::All { reply } => {
            let _ = reply.send(run_all(manager, outputs).await);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigElement;
    use crate::StatusCode;
    use dqmwatch_types::{Axis, Histogram1D, Verdict};

    fn manager() -> MonitorElementManager {
        let mut manager = MonitorElementManager::new();
        let mut h = Histogram1D::new("energy", "", Axis::new(5, 0.0, 5.0));
        h.fill(2.5);
        manager.book_object("/calo", h.clone().into()).unwrap().set_reference(h.into());
        manager
            .create_quality_test(&ConfigElement::qtest("exact", "ExactRefCompareTest"))
            .unwrap();
        manager.add_quality_test("/calo", "energy", "exact").unwrap();
        manager
    }

    #[tokio::test]
    async fn run_now_emits_to_outputs() {
        let (output, mut rx) = Output::channel(4);
        let service = QualityService::builder().manager(manager()).output(output).build();

        let document = service.run_now().await.unwrap();
        assert_eq!(document.qreports.len(), 1);
        assert_eq!(document.qreports[0].verdict, Verdict::Success);
        assert_eq!(rx.recv().await.unwrap(), document);
    }

    #[tokio::test]
    async fn handle_serves_requests() {
        let service = QualityService::new(manager());
        let handle = service.start();

        let reports = handle.run_quality_test("/calo", "energy", "exact").await.unwrap();
        assert_eq!(reports.report("/calo", "energy", "exact").unwrap().verdict, Verdict::Success);

        let reports = handle.run_element("/calo", "energy").await.unwrap();
        assert_eq!(reports.len(), 1);

        let err = handle.run_element("/calo", "missing").await.unwrap_err();
        assert_eq!(err.code(), StatusCode::NotFound);

        assert_eq!(handle.run_all().await.unwrap().qreports.len(), 1);
        handle.stop();
    }

    #[tokio::test]
    async fn manager_changes_are_seen_by_worker() {
        let service = QualityService::new(manager());
        let handle = service.start();

        service.manager().write().remove_monitor_element("/calo", "energy").unwrap();
        assert!(handle.run_all().await.unwrap().qreports.is_empty());
        handle.stop();
    }

    #[tokio::test]
    async fn stopped_service_rejects_requests() {
        let service = QualityService::new(manager());
        let handle = service.start();
        handle.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = handle.run_all().await.unwrap_err();
        assert_eq!(err.code(), StatusCode::NotInitialized);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_runs_periodically() {
        let (output, mut rx) = Output::channel(8);
        let service = QualityService::builder()
            .manager(manager())
            .output(output)
            .interval(Duration::from_secs(10))
            .build();
        let handle = service.start();

        assert!(rx.recv().await.is_some());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(rx.recv().await.is_some());
        handle.stop();
    }
}
