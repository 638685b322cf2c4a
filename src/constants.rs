// -
// Collection names

pub const MACHINES_C: &str = "machines";
pub const SERVICES_C: &str = "services";
pub const UNITS_C: &str = "units";
pub const RELATIONS_C: &str = "relations";
pub const RELATION_SCOPES_C: &str = "relationscopes";
pub const SETTINGS_C: &str = "settings";

// -
// Settings keys

/// Key of the environment settings document
pub const ENVIRON_SETTINGS_KEY: &str = "e";

/// Prefix of service configuration settings keys (`s#<service>`)
pub const SERVICE_SETTINGS_PREFIX: &str = "s#";

/// Separator between a relation scope and a participant name
pub(crate) const SCOPE_SEPARATOR: char = '#';

/// Revision reported for documents that have been removed
pub const REVNO_REMOVED: i64 = -1;

// -
// Watcher kinds, used as log and metric labels

pub(crate) const KIND_LIFECYCLES: &str = "lifecycles";
pub(crate) const KIND_RELATIONS: &str = "service_relations";
pub(crate) const KIND_MACHINE_UNITS: &str = "machine_units";
pub(crate) const KIND_PRINCIPAL_UNITS: &str = "principal_units";
pub(crate) const KIND_SCOPE: &str = "relation_scope";
pub(crate) const KIND_RELATION_UNITS: &str = "relation_units";
pub(crate) const KIND_SETTINGS: &str = "settings";
pub(crate) const KIND_ENVIRON_CONFIG: &str = "environ_config";
pub(crate) const KIND_ENTITY: &str = "entity";
