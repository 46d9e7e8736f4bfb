#![allow(clippy::unwrap_used, clippy::expect_used, dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use scm_update_lib::{
    GlobalUpdateStep, NamespaceUpdateContext, NamespaceUpdateStep, RepositoryUpdateContext,
    RepositoryUpdateStep, StepOrigin, UpdateStepTarget, Version,
};

/// Shared list of invocations, in the order they happened.
pub type Journal = Rc<RefCell<Vec<String>>>;

pub fn journal() -> Journal {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn entries(journal: &Journal) -> Vec<String> {
    journal.borrow().clone()
}

/// Step that appends `type:version` (global), `type:version/<namespace>` or
/// `type:version-<repository>` to a journal.
pub struct RecordingStep {
    data_type: String,
    version: Version,
    origin: StepOrigin,
    journal: Journal,
    fail_on: Option<String>,
}

impl RecordingStep {
    pub fn new(data_type: &str, version: &str, journal: &Journal) -> Self {
        Self {
            data_type: data_type.to_string(),
            version: version.parse().expect("valid step version"),
            origin: StepOrigin::Plugin,
            journal: Rc::clone(journal),
            fail_on: None,
        }
    }

    pub fn core(mut self) -> Self {
        self.origin = StepOrigin::Core;
        self
    }

    /// Fails for the given owner, or on every invocation with `"*"`.
    pub fn failing_on(mut self, owner: &str) -> Self {
        self.fail_on = Some(owner.to_string());
        self
    }

    pub fn failing(self) -> Self {
        self.failing_on("*")
    }

    fn invoke(&self, owner: Option<&str>, entry: String) -> anyhow::Result<()> {
        self.journal.borrow_mut().push(entry);
        match (&self.fail_on, owner) {
            (Some(fail_on), _) if fail_on == "*" => {
                anyhow::bail!("{} failed", self.data_type)
            }
            (Some(fail_on), Some(owner)) if fail_on == owner => {
                anyhow::bail!("{} failed for {owner}", self.data_type)
            }
            _ => Ok(()),
        }
    }
}

impl UpdateStepTarget for RecordingStep {
    fn target_version(&self) -> Version {
        self.version.clone()
    }

    fn affected_data_type(&self) -> &str {
        &self.data_type
    }

    fn origin(&self) -> StepOrigin {
        self.origin
    }
}

impl GlobalUpdateStep for RecordingStep {
    fn do_update(&self) -> anyhow::Result<()> {
        self.invoke(None, format!("{}:{}", self.data_type, self.version))
    }
}

impl NamespaceUpdateStep for RecordingStep {
    fn do_update(&self, context: &NamespaceUpdateContext) -> anyhow::Result<()> {
        let namespace = context.namespace();
        self.invoke(
            Some(namespace),
            format!("{}:{}/{namespace}", self.data_type, self.version),
        )
    }
}

impl RepositoryUpdateStep for RecordingStep {
    fn do_update(&self, context: &RepositoryUpdateContext) -> anyhow::Result<()> {
        let repository_id = context.repository_id();
        self.invoke(
            Some(repository_id),
            format!("{}:{}-{repository_id}", self.data_type, self.version),
        )
    }
}
