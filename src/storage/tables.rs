use redb::TableDefinition;

/// Identities: user_id -> Identity (msgpack)
pub const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");

/// Unique index: username -> user_id
pub const USERNAMES: TableDefinition<&str, u64> = TableDefinition::new("usernames");

/// Unique index: email -> user_id
pub const EMAILS: TableDefinition<&str, u64> = TableDefinition::new("emails");

/// Books: book_id -> Book (msgpack)
pub const BOOKS: TableDefinition<i64, &[u8]> = TableDefinition::new("books");

/// Auto-increment counters: name -> last issued id
pub const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");
