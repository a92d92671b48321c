//! Monitor elements: a monitored object, its optional reference and the
//! quality tests attached to it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use dqmwatch_types::MonitorObject;

use crate::directory::Named;
use crate::qtest::QualityTest;

/// How a monitor element holds its object.
#[derive(Debug, Clone)]
pub enum ObjectHandle {
    /// Booked by the manager and destroyed with the element.
    Owned(MonitorObject),
    /// Adopted from elsewhere; removing the element leaves the object alive
    /// for its other holders.
    Shared(Arc<MonitorObject>),
}

impl ObjectHandle {
    pub fn get(&self) -> &MonitorObject {
        match self {
            ObjectHandle::Owned(object) => object,
            ObjectHandle::Shared(object) => object.as_ref(),
        }
    }
}

/// A monitored object with its reference and attached quality tests.
pub struct MonitorElement {
    object: ObjectHandle,
    reference: Option<MonitorObject>,
    qtests: BTreeMap<String, Arc<dyn QualityTest>>,
}

impl MonitorElement {
    /// Wrap an object owned by the element.
    pub fn new(object: MonitorObject) -> Self {
        Self {
            object: ObjectHandle::Owned(object),
            reference: None,
            qtests: BTreeMap::new(),
        }
    }

    /// Wrap an object that stays owned by the caller.
    pub fn handled(object: Arc<MonitorObject>) -> Self {
        Self {
            object: ObjectHandle::Shared(object),
            reference: None,
            qtests: BTreeMap::new(),
        }
    }

    /// The monitored object.
    pub fn object(&self) -> &MonitorObject {
        self.object.get()
    }

    /// Mutable access to an owned object. `None` for handled objects.
    pub fn object_mut(&mut self) -> Option<&mut MonitorObject> {
        match &mut self.object {
            ObjectHandle::Owned(object) => Some(object),
            ObjectHandle::Shared(_) => None,
        }
    }

    /// Whether the element owns its object.
    pub fn is_owned(&self) -> bool {
        matches!(self.object, ObjectHandle::Owned(_))
    }

    /// Class name of the monitored object.
    pub fn class_name(&self) -> &'static str {
        self.object().class_name()
    }

    pub fn title(&self) -> &str {
        self.object().title()
    }

    /// The reference object, if one is attached.
    pub fn reference(&self) -> Option<&MonitorObject> {
        self.reference.as_ref()
    }

    pub fn has_reference(&self) -> bool {
        self.reference.is_some()
    }

    /// Attach a reference, returning the one it replaces.
    pub fn set_reference(&mut self, reference: MonitorObject) -> Option<MonitorObject> {
        self.reference.replace(reference)
    }

    /// Detach the reference.
    pub fn clear_reference(&mut self) -> Option<MonitorObject> {
        self.reference.take()
    }

    /// Attached quality tests by name.
    pub fn qtests(&self) -> &BTreeMap<String, Arc<dyn QualityTest>> {
        &self.qtests
    }

    /// Names of the attached quality tests.
    pub fn qtest_names(&self) -> impl Iterator<Item = &str> {
        self.qtests.keys().map(String::as_str)
    }

    pub fn has_qtest(&self, name: &str) -> bool {
        self.qtests.contains_key(name)
    }

    pub(crate) fn attach_qtest(&mut self, qtest: Arc<dyn QualityTest>) -> bool {
        let name = qtest.name().to_string();
        if self.qtests.contains_key(&name) {
            return false;
        }
        self.qtests.insert(name, qtest);
        true
    }

    pub(crate) fn detach_qtest(&mut self, name: &str) -> Option<Arc<dyn QualityTest>> {
        self.qtests.remove(name)
    }

    pub(crate) fn detach_all_qtests(&mut self) {
        self.qtests.clear();
    }
}

impl Named for MonitorElement {
    fn name(&self) -> &str {
        self.object().name()
    }
}

impl fmt::Debug for MonitorElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MonitorElement")
            .field("name", &self.name())
            .field("class", &self.class_name())
            .field("owned", &self.is_owned())
            .field("reference", &self.has_reference())
            .field("qtests", &self.qtests.keys().collect::<Vec<_>>())
            .finish()
    }
}
