use serde::{Deserialize, Serialize};

/// One object type of a permissions schema, as persisted by the datastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl NamespaceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            relations: Vec::new(),
        }
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(flatten)]
    pub kind: RelationKind,
}

impl Relation {
    pub fn relation(name: impl Into<String>, allowed: Vec<AllowedSubject>) -> Self {
        Self {
            name: name.into(),
            comment: None,
            kind: RelationKind::Relation { allowed },
        }
    }

    pub fn permission(name: impl Into<String>, rewrite: Rewrite) -> Self {
        Self {
            name: name.into(),
            comment: None,
            kind: RelationKind::Permission { rewrite },
        }
    }

    pub fn is_permission(&self) -> bool {
        matches!(self.kind, RelationKind::Permission { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationKind {
    Relation { allowed: Vec<AllowedSubject> },
    Permission { rewrite: Rewrite },
}

/// A subject type a relation may point at: `user`, `group#member` or `user:*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedSubject {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(default)]
    pub wildcard: bool,
}

impl AllowedSubject {
    pub fn direct(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: None,
            wildcard: false,
        }
    }

    pub fn with_relation(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: Some(relation.into()),
            wildcard: false,
        }
    }

    pub fn wildcard(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: None,
            wildcard: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "children", rename_all = "snake_case")]
pub enum Rewrite {
    Union(Vec<RewriteChild>),
    Intersection(Vec<RewriteChild>),
    Exclusion(Vec<RewriteChild>),
}

impl Rewrite {
    pub fn children(&self) -> &[RewriteChild] {
        match self {
            Rewrite::Union(children)
            | Rewrite::Intersection(children)
            | Rewrite::Exclusion(children) => children,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewriteChild {
    This,
    Nil,
    Computed(String),
    TupleToUserset { tupleset: String, computed: String },
    Nested(Box<Rewrite>),
}
