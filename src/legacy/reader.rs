use std::fmt;
use std::rc::Rc;

use super::{LegacyPropertyMap, V1Properties};

/// Declares which legacy store to read and builds a filterable view over it.
pub trait V1PropertyReader {
    fn store_name(&self) -> &'static str;

    fn create_instance<'a>(&self, all: &'a LegacyPropertyMap) -> Instance<'a> {
        Instance::new(all)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RepositoryV1PropertyReader;

impl V1PropertyReader for RepositoryV1PropertyReader {
    fn store_name(&self) -> &'static str {
        "repository-properties-v1"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UserV1PropertyReader;

impl V1PropertyReader for UserV1PropertyReader {
    fn store_name(&self) -> &'static str {
        "user-properties-v1"
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GroupV1PropertyReader;

impl V1PropertyReader for GroupV1PropertyReader {
    fn store_name(&self) -> &'static str {
        "group-properties-v1"
    }
}

type Predicate = Rc<dyn Fn(&V1Properties) -> bool>;

/// A view over `owner id -> properties`. Filters narrow the view and return a
/// new instance; the source map and earlier instances are untouched.
/// Predicates are evaluated during iteration.
#[derive(Clone)]
pub struct Instance<'a> {
    all: &'a LegacyPropertyMap,
    filters: Vec<Predicate>,
}

impl<'a> Instance<'a> {
    pub fn new(all: &'a LegacyPropertyMap) -> Self {
        Self {
            all,
            filters: Vec::new(),
        }
    }

    /// Keeps owners having at least one of `keys`.
    pub fn having_any_of<S: AsRef<str>>(&self, keys: &[S]) -> Instance<'a> {
        let keys = owned(keys);
        self.with_filter(Rc::new(move |properties: &V1Properties| {
            properties.has_any(keys.as_slice())
        }))
    }

    /// Keeps owners having every one of `keys`.
    pub fn having_all_of<S: AsRef<str>>(&self, keys: &[S]) -> Instance<'a> {
        let keys = owned(keys);
        self.with_filter(Rc::new(move |properties: &V1Properties| {
            properties.has_all(keys.as_slice())
        }))
    }

    fn with_filter(&self, filter: Predicate) -> Instance<'a> {
        let mut filters = self.filters.clone();
        filters.push(filter);
        Instance {
            all: self.all,
            filters,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&'a str, &'a V1Properties)> + '_ {
        self.all
            .iter()
            .filter(|(_, properties)| self.filters.iter().all(|filter| filter(*properties)))
            .map(|(owner, properties)| (owner.as_str(), properties))
    }

    pub fn for_each_entry<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &V1Properties),
    {
        for (owner, properties) in self.entries() {
            visit(owner, properties);
        }
    }

    /// Like [`Instance::for_each_entry`], stopping at the first error.
    pub fn try_for_each_entry<F, E>(&self, mut visit: F) -> Result<(), E>
    where
        F: FnMut(&str, &V1Properties) -> Result<(), E>,
    {
        self.entries()
            .try_for_each(|(owner, properties)| visit(owner, properties))
    }
}

impl fmt::Debug for Instance<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("owners", &self.all.len())
            .field("filters", &self.filters.len())
            .finish()
    }
}

fn owned<S: AsRef<str>>(keys: &[S]) -> Vec<String> {
    keys.iter().map(|key| key.as_ref().to_string()).collect()
}
