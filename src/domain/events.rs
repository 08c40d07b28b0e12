use crate::domain::EntryId;

/// Mutations of the identity registry, in the order they were applied.
#[derive(Clone, PartialEq, Debug)]
pub enum RegistryEvent {
    Added(EntryId),
    Updated(EntryId),
    Removed(EntryId),
}
