/// Object types the core writes relation tuples for (`spec.md` §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectType {
    User,
    Service,
    Role,
    Group,
    Permission,
}

impl ObjectType {
    pub const fn as_str(self) -> &'static str {
        match self {
            ObjectType::User => "user",
            ObjectType::Service => "service",
            ObjectType::Role => "role",
            ObjectType::Group => "group",
            ObjectType::Permission => "permission",
        }
    }
}

/// Formats a `type:id` subject/object reference, the shape every tuple in
/// `spec.md` §6 uses (`role:R`, `user:U`). Centralized here so every call
/// site agrees on the separator.
pub fn typed_ref(object_type: ObjectType, id: &str) -> String {
    format!("{}:{id}", object_type.as_str())
}

/// A relation tuple: `(object, relation, subject)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTuple {
    pub object: String,
    pub relation: String,
    pub subject: String,
}

impl RelationTuple {
    pub fn new(object: impl Into<String>, relation: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            relation: relation.into(),
            subject: subject.into(),
        }
    }

    /// Builds the `(role:R, member, user:U)` tuple the `Materializer`
    /// writes on fan-out / deletes on fan-in (`spec.md` §6).
    pub fn role_membership(role_id: &str, subject_type: ObjectType, subject_id: &str) -> Self {
        Self::new(
            typed_ref(ObjectType::Role, role_id),
            "member",
            typed_ref(subject_type, subject_id),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_ref_formats_as_type_colon_id() {
        assert_eq!(typed_ref(ObjectType::Role, "R1"), "role:R1");
        assert_eq!(typed_ref(ObjectType::User, "U1"), "user:U1");
    }

    #[test]
    fn role_membership_tuple_shape() {
        let tuple = RelationTuple::role_membership("R1", ObjectType::User, "U1");
        assert_eq!(tuple.object, "role:R1");
        assert_eq!(tuple.relation, "member");
        assert_eq!(tuple.subject, "user:U1");
    }
}
