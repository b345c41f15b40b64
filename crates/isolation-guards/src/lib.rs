//! Tenant isolation guards.
//!
//! Each guard validates a resource reference against the caller's verified
//! [`ProjectId`](tenantgate_core_types::ProjectId) and fails closed: a
//! foreign reference is always an error, never a filtered result.

pub mod channel;
pub mod connection;
pub mod path;
pub mod reserved;
pub mod schema;
pub mod subscriptions;

pub use channel::{
    assert_subscription, build_channel, parse_channel, ChannelType, ParsedChannel,
    MAX_IDENTIFIER_LEN,
};
pub use connection::{
    assert_search_path_untouched, search_path_statement, validate_schema_name, BackendError,
    ConnectionPool, PooledConnection, ScopedConnection,
};
pub use path::{assert_path, build_path, parse_path, ParsedPath, MAX_PATH_LEN, MAX_SCOPED_PATH_LEN};
pub use reserved::{is_reserved_name, is_reserved_segment, RESERVED_NAMES};
pub use schema::{
    assert_query_isolation, assert_single_statement, is_system_schema, referenced_schemas,
    SYSTEM_SCHEMAS,
};
pub use subscriptions::{
    InMemorySubscriptionStore, Subscription, SubscriptionManager, SubscriptionStore,
};
