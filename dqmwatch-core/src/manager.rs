//! The monitor element manager.

use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::Arc;

use dqmwatch_types::MonitorObject;
use tracing::{debug, error, info};

use crate::config::ConfigElement;
use crate::directory::{DirectoryId, Named};
use crate::element::MonitorElement;
use crate::error::{DqmError, Result};
use crate::object_types::ObjectTypeRegistry;
use crate::path::DirPath;
use crate::qtest::{self, FactoryRegistry, QualityTest};
use crate::report::ReportStorage;
use crate::storage::Storage;
use crate::store::{full_path, ObjectStore};

/// Owns the monitor elements, the quality tests and runs them.
///
/// Elements live in a [`Storage`] keyed by directory path and object name.
/// Quality tests are created once from configuration, registered by name
/// and shared by every element they are attached to.
///
/// The manager is not internally synchronized; share it behind a lock (see
/// [`QualityService`](crate::QualityService)).
#[derive(Debug)]
pub struct MonitorElementManager {
    storage: Storage<MonitorElement>,
    factories: FactoryRegistry,
    object_types: ObjectTypeRegistry,
    qtests: BTreeMap<String, Arc<dyn QualityTest>>,
}

impl MonitorElementManager {
    /// A manager with the built-in quality-test and object types.
    pub fn new() -> Self {
        Self::with_registries(FactoryRegistry::with_builtins(), ObjectTypeRegistry::with_builtins())
    }

    pub fn with_registries(factories: FactoryRegistry, object_types: ObjectTypeRegistry) -> Self {
        Self {
            storage: Storage::new(),
            factories,
            object_types,
            qtests: BTreeMap::new(),
        }
    }

    pub fn storage(&self) -> &Storage<MonitorElement> {
        &self.storage
    }

    pub fn factories(&self) -> &FactoryRegistry {
        &self.factories
    }

    pub fn object_types(&self) -> &ObjectTypeRegistry {
        &self.object_types
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    pub fn mkdir(&mut self, path: &str) -> Result<DirectoryId> {
        self.storage.mkdir(path)
    }

    pub fn cd(&mut self, path: &str) -> Result<()> {
        self.storage.cd(path)
    }

    pub fn cd_root(&mut self) {
        self.storage.cd_root()
    }

    pub fn go_up(&mut self) -> Result<()> {
        self.storage.go_up()
    }

    /// Full path of the current directory.
    pub fn pwd(&self) -> DirPath {
        self.storage.current_path()
    }

    pub fn dir_exists(&self, path: &str) -> bool {
        self.storage.dir_exists(path)
    }

    /// Remove a directory with every element below it.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        self.storage.rmdir(path)
    }

    /// Canonical full path of the existing directory `path`.
    fn canonical(&self, path: &str) -> Result<String> {
        self.storage
            .resolve(path)?
            .and_then(|id| self.storage.directory(id))
            .map(|dir| dir.full_path().as_str().to_string())
            .ok_or_else(|| DqmError::not_found(format!("directory '{path}'")))
    }

    // ------------------------------------------------------------------
    // Elements
    // ------------------------------------------------------------------

    fn insert(&mut self, path: &str, element: MonitorElement) -> Result<&mut MonitorElement> {
        let id = self.storage.mkdir(path)?;
        let name = element.name().to_string();
        self.storage.add_to(id, element)?;
        debug!("Booked monitor element '{}' in '{}'", name, path);
        self.storage
            .find_object_mut(path, |e| e.name() == name)
            .ok_or_else(|| DqmError::not_found(format!("monitor element '{path}/{name}'")))
    }

    /// Book a new object of class `class` named `name` in `path`.
    ///
    /// Missing directories are created. Fails with NOT_FOUND for an unknown
    /// class, NOT_ALLOWED when the class lacks a required capability and
    /// ALREADY_PRESENT when `path` already holds an element named `name`.
    pub fn book_monitor_element(&mut self, class: &str, path: &str, name: &str) -> Result<&mut MonitorElement> {
        let object = self.object_types.instantiate(class, name)?;
        self.insert(path, MonitorElement::new(object))
    }

    /// Book an already built object, owned by the manager from now on.
    pub fn book_object(&mut self, path: &str, object: MonitorObject) -> Result<&mut MonitorElement> {
        self.insert(path, MonitorElement::new(object))
    }

    /// Adopt an object that stays shared with the caller.
    pub fn handle_monitor_element(&mut self, path: &str, object: Arc<MonitorObject>) -> Result<&mut MonitorElement> {
        self.insert(path, MonitorElement::handled(object))
    }

    /// Read the object `path`/`name` from `store` and book it.
    pub fn read_monitor_element(
        &mut self,
        store: &dyn ObjectStore,
        path: &str,
        name: &str,
    ) -> Result<&mut MonitorElement> {
        let key = full_path(self.storage.absolute_path(path)?.as_str(), name);
        let object = store
            .get(&key)
            .ok_or_else(|| DqmError::not_found(format!("object '{key}' in {}", store.description())))?;
        self.book_object(path, object)
    }

    /// Attach the object stored under the element's full path in `store` as
    /// its reference, replacing any previous one.
    pub fn attach_reference(&mut self, path: &str, name: &str, store: &dyn ObjectStore) -> Result<()> {
        let key = full_path(&self.canonical(path)?, name);
        let element = self.get_monitor_element_mut(path, name)?;
        let reference = store
            .get(&key)
            .ok_or_else(|| DqmError::not_found(format!("reference '{key}' in {}", store.description())))?;
        element.set_reference(reference);
        debug!("Attached reference '{}' from {}", key, store.description());
        Ok(())
    }

    /// Attach references to every element `store` has one for.
    ///
    /// Returns the number of references attached.
    pub fn attach_references(&mut self, store: &dyn ObjectStore) -> usize {
        let mut targets = Vec::new();
        self.storage.iterate(|dir, element| {
            targets.push(full_path(dir.full_path().as_str(), element.name()));
            ControlFlow::Continue(())
        });

        let mut attached = 0;
        for key in targets {
            let Some(reference) = store.get(&key) else {
                continue;
            };
            let (dir, name) = key.rsplit_once('/').unwrap_or(("", key.as_str()));
            let dir = if dir.is_empty() { "/" } else { dir };
            if let Some(element) = self.storage.find_object_mut(dir, |e| e.name() == name) {
                element.set_reference(reference);
                attached += 1;
            }
        }
        info!("Attached {} reference(s) from {}", attached, store.description());
        attached
    }

    /// The element named `name` in `path`.
    pub fn get_monitor_element(&self, path: &str, name: &str) -> Result<&MonitorElement> {
        self.storage
            .find_object(path, |e| e.name() == name)
            .ok_or_else(|| DqmError::not_found(format!("monitor element '{path}/{name}'")))
    }

    pub fn get_monitor_element_mut(&mut self, path: &str, name: &str) -> Result<&mut MonitorElement> {
        self.storage
            .find_object_mut(path, |e| e.name() == name)
            .ok_or_else(|| DqmError::not_found(format!("monitor element '{path}/{name}'")))
    }

    /// First element named `name` anywhere, with its directory path.
    pub fn find_monitor_element(&self, name: &str) -> Result<(DirPath, &MonitorElement)> {
        let (id, element) = self
            .storage
            .find_global(|e| e.name() == name)
            .ok_or_else(|| DqmError::not_found(format!("monitor element '{name}'")))?;
        let path = self
            .storage
            .directory(id)
            .map(|d| d.full_path())
            .unwrap_or_else(|| DirPath::new("/"));
        Ok((path, element))
    }

    /// Every element with its directory path, in traversal order.
    pub fn monitor_elements(&self) -> Vec<(DirPath, &MonitorElement)> {
        let mut elements = Vec::new();
        self.storage.iterate(|dir, element| {
            elements.push((dir.full_path(), element));
            ControlFlow::Continue(())
        });
        elements
    }

    /// Detach every test from the element and destroy it.
    ///
    /// Reports already produced for it live in the caller's
    /// [`ReportStorage`]; see [`ReportStorage::remove_element`].
    pub fn remove_monitor_element(&mut self, path: &str, name: &str) -> Result<()> {
        self.get_monitor_element_mut(path, name)?.detach_all_qtests();
        self.storage.remove_named(path, name)?;
        debug!("Removed monitor element '{}' from '{}'", name, path);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Quality tests
    // ------------------------------------------------------------------

    /// Create a quality test from `config` and register it by name.
    ///
    /// Nothing is registered if the type is unknown, the name is taken or
    /// the configuration is rejected.
    pub fn create_quality_test(&mut self, config: &ConfigElement) -> Result<()> {
        let name = config.required_attribute("name")?;
        if self.qtests.contains_key(name) {
            return Err(DqmError::already_present(format!("quality test '{name}'")));
        }
        let qtest = self.factories.create(config)?;
        info!("Created quality test '{}' of type '{}'", qtest.name(), qtest.qtest_type());
        self.qtests.insert(qtest.name().to_string(), qtest);
        Ok(())
    }

    /// The registered quality test `name`.
    pub fn quality_test(&self, name: &str) -> Result<Arc<dyn QualityTest>> {
        self.qtests
            .get(name)
            .cloned()
            .ok_or_else(|| DqmError::not_found(format!("quality test '{name}'")))
    }

    /// Names of the registered quality tests, sorted.
    pub fn quality_test_names(&self) -> impl Iterator<Item = &str> {
        self.qtests.keys().map(String::as_str)
    }

    /// Attach the registered test `qtest` to element `path`/`name`.
    pub fn add_quality_test(&mut self, path: &str, name: &str, qtest: &str) -> Result<()> {
        let test = self.quality_test(qtest)?;
        let element = self.get_monitor_element_mut(path, name)?;
        if !element.attach_qtest(test) {
            return Err(DqmError::already_present(format!(
                "quality test '{qtest}' on '{path}/{name}'"
            )));
        }
        Ok(())
    }

    /// Detach `qtest` from element `path`/`name`.
    pub fn remove_quality_test(&mut self, path: &str, name: &str, qtest: &str) -> Result<()> {
        self.get_monitor_element_mut(path, name)?
            .detach_qtest(qtest)
            .map(|_| ())
            .ok_or_else(|| DqmError::not_found(format!("quality test '{qtest}' on '{path}/{name}'")))
    }

    // ------------------------------------------------------------------
    // Runs
    // ------------------------------------------------------------------

    /// Run `test` on `element`; internal failures become ERROR reports.
    fn run_one(test: &dyn QualityTest, path: &str, element: &MonitorElement) -> dqmwatch_types::QualityReport {
        match qtest::execute(test, path, element) {
            Ok(report) => report,
            Err(err) => qtest::internal_error_report(test, path, element, err.to_string()),
        }
    }

    /// Run the attached test `qtest` on element `path`/`name`.
    pub fn run_quality_test(&self, path: &str, name: &str, qtest: &str, reports: &mut ReportStorage) -> Result<()> {
        let canonical = self.canonical(path)?;
        let element = self.get_monitor_element(path, name)?;
        let test = element
            .qtests()
            .get(qtest)
            .ok_or_else(|| DqmError::not_found(format!("quality test '{qtest}' on '{path}/{name}'")))?;
        reports.add_report(Self::run_one(test.as_ref(), &canonical, element));
        Ok(())
    }

    /// Run every test attached to element `path`/`name`.
    pub fn run_quality_tests_for(&self, path: &str, name: &str, reports: &mut ReportStorage) -> Result<()> {
        let canonical = self.canonical(path)?;
        let element = self.get_monitor_element(path, name)?;
        for test in element.qtests().values() {
            reports.add_report(Self::run_one(test.as_ref(), &canonical, element));
        }
        Ok(())
    }

    /// Run every attached test on every element, depth first.
    ///
    /// Fails fast: the first internal failure aborts the run with
    /// [`DqmError::Failure`] and `reports` is left untouched. Otherwise all
    /// produced reports are merged into `reports`.
    pub fn run_quality_tests(&self, reports: &mut ReportStorage) -> Result<()> {
        let mut produced = ReportStorage::new();
        let mut failure: Option<DqmError> = None;

        self.storage.iterate(|dir, element| {
            let path = dir.full_path();
            for test in element.qtests().values() {
                match qtest::execute(test.as_ref(), path.as_str(), element) {
                    Ok(report) => {
                        produced.add_report(report);
                    }
                    Err(err) => {
                        error!(
                            "Aborting quality test run: '{}' failed on '{}/{}': {}",
                            test.name(),
                            path,
                            element.name(),
                            err
                        );
                        failure = Some(DqmError::Failure(format!(
                            "quality test '{}' on '{}/{}': {}",
                            test.name(),
                            path,
                            element.name(),
                            err
                        )));
                        return ControlFlow::Break(());
                    }
                }
            }
            ControlFlow::Continue(())
        });

        if let Some(err) = failure {
            return Err(err);
        }
        info!("Ran {} quality test(s)", produced.len());
        reports.add_reports(produced);
        Ok(())
    }
}

impl Default for MonitorElementManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qtest::{ConfigurableTest, Evaluation, QTestError, QualityTestFactory, QualityTestSettings};
    use crate::store::MemoryStore;
    use crate::StatusCode;
    use dqmwatch_types::{Axis, Graph, Histogram1D, Scalar, Verdict};

    fn histogram(name: &str) -> MonitorObject {
        let mut h = Histogram1D::new(name, "", Axis::new(10, 0.0, 10.0));
        for i in 0..40 {
            h.fill((i % 10) as f64 + 0.5);
        }
        h.into()
    }

    /// Two elements with references and two tests attached to each.
    fn campaign() -> MonitorElementManager {
        let mut manager = MonitorElementManager::new();
        for (path, name) in [("/calo", "energy"), ("/tracker/hits", "occupancy")] {
            manager.book_object(path, histogram(name)).unwrap().set_reference(histogram(name));
        }
        manager
            .create_quality_test(&ConfigElement::qtest("exact", "ExactRefCompareTest"))
            .unwrap();
        manager.create_quality_test(&ConfigElement::qtest("chi2", "Chi2Test")).unwrap();
        for (path, name) in [("/calo", "energy"), ("/tracker/hits", "occupancy")] {
            manager.add_quality_test(path, name, "exact").unwrap();
            manager.add_quality_test(path, name, "chi2").unwrap();
        }
        manager
    }

    // ========================================================================
    // Element Tests
    // ========================================================================

    #[test]
    fn book_by_class_creates_directories() {
        let mut manager = MonitorElementManager::new();
        let element = manager.book_monitor_element("H1F", "/a/b", "h").unwrap();
        assert_eq!(element.class_name(), "H1F");
        assert!(manager.dir_exists("/a/b"));
        assert_eq!(manager.get_monitor_element("/a/b", "h").unwrap().name(), "h");
    }

    #[test]
    fn book_unknown_class_fails() {
        let mut manager = MonitorElementManager::new();
        let err = manager.book_monitor_element("TProfile", "/", "p").unwrap_err();
        assert_eq!(err.code(), StatusCode::NotFound);
    }

    #[test]
    fn duplicate_booking_is_rejected() {
        let mut manager = MonitorElementManager::new();
        manager.book_object("/a", Scalar::int("n", 1).into()).unwrap();
        let err = manager.book_object("/a", Scalar::int("n", 2).into()).unwrap_err();
        assert_eq!(err.code(), StatusCode::AlreadyPresent);
        assert_eq!(manager.storage().object_count(), 1);
        assert_eq!(
            manager.get_monitor_element("/a", "n").unwrap().object(),
            &MonitorObject::from(Scalar::int("n", 1))
        );
    }

    #[test]
    fn handled_objects_stay_shared() {
        let mut manager = MonitorElementManager::new();
        let object = Arc::new(MonitorObject::from(Graph::new("g", "")));
        manager.handle_monitor_element("/", object.clone()).unwrap();
        assert_eq!(Arc::strong_count(&object), 2);
        manager.remove_monitor_element("/", "g").unwrap();
        assert_eq!(Arc::strong_count(&object), 1);
    }

    #[test]
    fn read_and_attach_from_store() {
        let mut store = MemoryStore::new();
        store.insert("/calo", histogram("energy"));
        let mut references = MemoryStore::new();
        references.insert("/calo", histogram("energy"));

        let mut manager = MonitorElementManager::new();
        manager.read_monitor_element(&store, "/calo", "energy").unwrap();
        assert_eq!(
            manager.read_monitor_element(&store, "/calo", "missing").unwrap_err().code(),
            StatusCode::NotFound
        );

        manager.cd("/calo").unwrap();
        manager.attach_reference("energy", "energy", &references).unwrap_err();
        manager.attach_reference(".", "energy", &references).unwrap();
        assert!(manager.get_monitor_element("/calo", "energy").unwrap().has_reference());

        manager.cd_root();
        manager.book_object("/calo", Scalar::int("other", 1).into()).unwrap();
        assert_eq!(
            manager.attach_reference("/calo", "other", &references).unwrap_err().code(),
            StatusCode::NotFound
        );
        assert_eq!(manager.attach_references(&references), 1);
    }

    #[test]
    fn read_resolves_relative_paths_from_cursor() {
        let mut store = MemoryStore::new();
        store.insert("/det/calo", Scalar::int("n", 7).into());

        let mut manager = MonitorElementManager::new();
        manager.mkdir("/det").unwrap();
        manager.cd("/det").unwrap();
        manager.read_monitor_element(&store, "calo", "n").unwrap();
        assert!(manager.get_monitor_element("/det/calo", "n").is_ok());
        assert!(!manager.dir_exists("/calo"));

        manager.cd("/det/calo").unwrap();
        assert_eq!(
            manager.read_monitor_element(&store, "../calo", "n").unwrap_err().code(),
            StatusCode::AlreadyPresent
        );
    }

    #[test]
    fn invalid_element_names_are_rejected() {
        let mut manager = MonitorElementManager::new();
        for name in ["a/b", "x?", ""] {
            let err = manager.book_object("/calo", Scalar::int(name, 1).into()).unwrap_err();
            assert_eq!(err.code(), StatusCode::InvalidParameter, "{name}");
        }
        assert_eq!(
            manager.book_monitor_element("H1F", "/calo", "bad*name").unwrap_err().code(),
            StatusCode::InvalidParameter
        );
        assert_eq!(manager.storage().object_count(), 0);
    }

    #[test]
    fn find_element_globally() {
        let manager = campaign();
        let (path, element) = manager.find_monitor_element("occupancy").unwrap();
        assert_eq!(path.as_str(), "/tracker/hits");
        assert_eq!(element.name(), "occupancy");
        assert!(manager.find_monitor_element("nothing").is_err());
        assert_eq!(manager.monitor_elements().len(), 2);
    }

    #[test]
    fn removal_drops_element_and_attachments() {
        let mut manager = campaign();
        let test = manager.quality_test("exact").unwrap();
        let before = Arc::strong_count(&test);
        manager.remove_monitor_element("/calo", "energy").unwrap();
        assert_eq!(Arc::strong_count(&test), before - 1);
        assert_eq!(
            manager.get_monitor_element("/calo", "energy").unwrap_err().code(),
            StatusCode::NotFound
        );
        assert!(manager.remove_monitor_element("/calo", "energy").is_err());

        let mut reports = ReportStorage::new();
        manager.run_quality_tests(&mut reports).unwrap();
        assert!(reports.reports_for("/calo", "energy").is_none());
        assert_eq!(reports.len(), 2);
    }

    // ========================================================================
    // Quality Test Registration Tests
    // ========================================================================

    #[test]
    fn create_quality_test_checks_name_and_type() {
        let mut manager = MonitorElementManager::new();
        let config = ConfigElement::qtest("ks", "KolmogorovTest");
        manager.create_quality_test(&config).unwrap();
        assert_eq!(
            manager.create_quality_test(&config).unwrap_err().code(),
            StatusCode::AlreadyPresent
        );
        assert_eq!(
            manager
                .create_quality_test(&ConfigElement::qtest("x", "Unknown"))
                .unwrap_err()
                .code(),
            StatusCode::NotFound
        );
        assert_eq!(manager.quality_test_names().collect::<Vec<_>>(), ["ks"]);
    }

    #[test]
    fn rejected_configuration_is_not_registered() {
        let mut manager = MonitorElementManager::new();
        let config = ConfigElement::qtest("fit", "FitParamInRangeTest")
            .with_parameter("FitFormula", "gaus")
            .with_parameter("TestParameter", 7)
            .with_parameter("DeviationLower", 0)
            .with_parameter("DeviationUpper", 1);
        assert!(manager.create_quality_test(&config).is_err());
        assert!(manager.quality_test("fit").is_err());
    }

    #[test]
    fn out_of_range_formula_parameter_is_a_creation_error() {
        let mut manager = MonitorElementManager::new();
        let config = ConfigElement::qtest("fit", "FitParamInRangeTest")
            .with_parameter("FitFormula", "[18446744073709551615]")
            .with_parameter("TestParameter", 0)
            .with_parameter("DeviationLower", 0)
            .with_parameter("DeviationUpper", 1);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| manager.create_quality_test(&config)));
        assert_eq!(outcome.unwrap().unwrap_err().code(), StatusCode::InvalidParameter);
        assert_eq!(manager.quality_test_names().count(), 0);
    }

    #[test]
    fn add_quality_test_requires_test_and_element() {
        let mut manager = campaign();
        assert_eq!(
            manager.add_quality_test("/calo", "energy", "nope").unwrap_err().code(),
            StatusCode::NotFound
        );
        assert_eq!(
            manager.add_quality_test("/calo", "nope", "exact").unwrap_err().code(),
            StatusCode::NotFound
        );
        assert_eq!(
            manager.add_quality_test("/calo", "energy", "exact").unwrap_err().code(),
            StatusCode::AlreadyPresent
        );
        manager.remove_quality_test("/calo", "energy", "exact").unwrap();
        assert!(manager.remove_quality_test("/calo", "energy", "exact").is_err());
    }

    // ========================================================================
    // Run Tests
    // ========================================================================

    #[test]
    fn bulk_run_produces_one_report_per_attachment() {
        let manager = campaign();
        let mut reports = ReportStorage::new();
        manager.run_quality_tests(&mut reports).unwrap();
        assert_eq!(reports.len(), 4);
        for (path, name) in [("/calo", "energy"), ("/tracker/hits", "occupancy")] {
            for qtest in ["exact", "chi2"] {
                let report = reports.report(path, name, qtest).unwrap();
                assert_eq!(report.verdict, Verdict::Success, "{path}/{name} {qtest}");
            }
        }
        reports.clear();
        assert!(reports.is_empty());
    }

    #[test]
    fn single_runs_use_canonical_paths() {
        let mut manager = campaign();
        manager.cd("/tracker").unwrap();
        let mut reports = ReportStorage::new();
        manager.run_quality_test("hits", "occupancy", "exact", &mut reports).unwrap();
        assert!(reports.report("/tracker/hits", "occupancy", "exact").is_ok());

        manager.run_quality_tests_for("/calo", "energy", &mut reports).unwrap();
        assert_eq!(reports.len(), 3);

        assert_eq!(
            manager
                .run_quality_test("/calo", "energy", "ks", &mut reports)
                .unwrap_err()
                .code(),
            StatusCode::NotFound
        );
    }

    #[test]
    fn missing_reference_is_reported_not_returned() {
        let mut manager = campaign();
        manager.book_object("/calo", histogram("bare")).unwrap();
        manager.add_quality_test("/calo", "bare", "exact").unwrap();
        let mut reports = ReportStorage::new();
        manager.run_quality_tests(&mut reports).unwrap();
        assert_eq!(reports.report("/calo", "bare", "exact").unwrap().verdict, Verdict::Invalid);
    }

    #[derive(Debug)]
    struct Exploding(QualityTestSettings);

    impl QualityTest for Exploding {
        fn settings(&self) -> &QualityTestSettings {
            &self.0
        }

        fn description(&self) -> &str {
            "fails internally"
        }

        fn evaluate(&self, _element: &MonitorElement) -> std::result::Result<Evaluation, QTestError> {
            Err(QTestError::internal("numerical failure"))
        }
    }

    impl ConfigurableTest for Exploding {
        const TYPE_NAME: &'static str = "Exploding";

        fn read_settings(settings: QualityTestSettings, _config: &ConfigElement) -> Result<Self> {
            Ok(Self(settings))
        }
    }

    #[test]
    fn internal_failures_are_errors_alone_and_abort_in_bulk() {
        let mut factories = FactoryRegistry::with_builtins();
        factories
            .register(Box::new(qtest::BuiltinFactory::<Exploding>::new()))
            .unwrap();
        let mut manager = MonitorElementManager::with_registries(factories, ObjectTypeRegistry::with_builtins());
        manager.book_object("/", histogram("h")).unwrap();
        manager.create_quality_test(&ConfigElement::qtest("boom", "Exploding")).unwrap();
        manager.add_quality_test("/", "h", "boom").unwrap();

        let mut reports = ReportStorage::new();
        manager.run_quality_test("/", "h", "boom", &mut reports).unwrap();
        let report = reports.report("/", "h", "boom").unwrap();
        assert_eq!(report.verdict, Verdict::Error);
        assert!(!report.success);
        assert_eq!(report.quality, None);

        let mut bulk = ReportStorage::new();
        let err = manager.run_quality_tests(&mut bulk).unwrap_err();
        assert_eq!(err.code(), StatusCode::Failure);
        assert!(bulk.is_empty());
    }

    #[test]
    fn factory_type_names_match_registry() {
        let manager = MonitorElementManager::new();
        for name in manager.factories().names() {
            assert_eq!(manager.factories().get(name).unwrap().type_name(), name);
        }
    }
}
