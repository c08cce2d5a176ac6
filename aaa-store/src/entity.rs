/// Maps a Rust struct to a SQL table: table name, id column, column list.
///
/// ```ignore
/// impl Entity for GroupRow {
///     type Id = String;
///     fn table_name() -> &'static str { "groups" }
///     fn id_column() -> &'static str { "id" }
///     fn columns() -> &'static [&'static str] {
///         &["id", "organization_id", "name", "parent_id", "version"]
///     }
///     fn id(&self) -> &String { &self.id }
/// }
/// ```
pub trait Entity: Send + Sync + Unpin + 'static {
    type Id: Send + Sync + ToString + 'static;

    fn table_name() -> &'static str;
    fn id_column() -> &'static str;
    fn columns() -> &'static [&'static str];
    fn id(&self) -> &Self::Id;
}

/// [`Entity`] extension for rows carrying an optimistic-lock `version`
/// column (Group, GroupMembership, GroupRole — `spec.md` §3/§5).
pub trait VersionedEntity: Entity {
    fn version(&self) -> i64;
    fn version_column() -> &'static str {
        "version"
    }
}
