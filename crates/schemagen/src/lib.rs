//! Reconstructs human-readable schema DSL from stored namespace definitions.

use shared::domain::{
    AllowedSubject, NamespaceDefinition, Relation, RelationKind, Rewrite, RewriteChild,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GenerateError {
    #[error("namespace definition has an empty name")]
    EmptyDefinitionName,
    #[error("definition `{definition}` contains a relation with an empty name")]
    EmptyRelationName { definition: String },
    #[error("relation `{definition}#{relation}` has no allowed subject types")]
    NoAllowedSubjects { definition: String, relation: String },
    #[error("permission `{definition}#{permission}` has an empty rewrite")]
    EmptyRewrite {
        definition: String,
        permission: String,
    },
    #[error("permission `{definition}#{permission}` references `_this`")]
    LegacyThis {
        definition: String,
        permission: String,
    },
}

pub trait SourceGenerator: Send + Sync {
    fn generate_source(&self, definition: &NamespaceDefinition) -> Result<String, GenerateError>;
}

/// Emits the `definition name { ... }` schema language.
#[derive(Debug, Clone, Copy, Default)]
pub struct DslGenerator;

impl SourceGenerator for DslGenerator {
    fn generate_source(&self, definition: &NamespaceDefinition) -> Result<String, GenerateError> {
        generate_source(definition)
    }
}

pub fn generate_source(definition: &NamespaceDefinition) -> Result<String, GenerateError> {
    if definition.name.trim().is_empty() {
        return Err(GenerateError::EmptyDefinitionName);
    }

    let mut out = String::new();
    if let Some(comment) = &definition.comment {
        push_comment(&mut out, comment, "");
    }

    if definition.relations.is_empty() {
        out.push_str(&format!("definition {} {{}}", definition.name));
        return Ok(out);
    }

    out.push_str(&format!("definition {} {{\n", definition.name));
    let mut previous_was_permission = None;
    for relation in &definition.relations {
        let line = relation_line(&definition.name, relation)?;
        let is_permission = relation.is_permission();
        if previous_was_permission.is_some_and(|previous| previous != is_permission) {
            out.push('\n');
        }
        if let Some(comment) = &relation.comment {
            push_comment(&mut out, comment, "\t");
        }
        out.push('\t');
        out.push_str(&line);
        out.push('\n');
        previous_was_permission = Some(is_permission);
    }
    out.push('}');

    Ok(out)
}

fn push_comment(out: &mut String, comment: &str, indent: &str) {
    for line in comment.lines() {
        out.push_str(indent);
        let line = line.trim_end();
        if line.is_empty() {
            out.push_str("//\n");
        } else {
            out.push_str("// ");
            out.push_str(line);
            out.push('\n');
        }
    }
}

fn relation_line(definition: &str, relation: &Relation) -> Result<String, GenerateError> {
    if relation.name.trim().is_empty() {
        return Err(GenerateError::EmptyRelationName {
            definition: definition.to_string(),
        });
    }

    match &relation.kind {
        RelationKind::Relation { allowed } => {
            if allowed.is_empty() {
                return Err(GenerateError::NoAllowedSubjects {
                    definition: definition.to_string(),
                    relation: relation.name.clone(),
                });
            }
            let subjects = allowed
                .iter()
                .map(subject_source)
                .collect::<Vec<_>>()
                .join(" | ");
            Ok(format!("relation {}: {subjects}", relation.name))
        }
        RelationKind::Permission { rewrite } => {
            let expression = rewrite_source(definition, &relation.name, rewrite)?;
            Ok(format!("permission {} = {expression}", relation.name))
        }
    }
}

fn subject_source(subject: &AllowedSubject) -> String {
    if subject.wildcard {
        return format!("{}:*", subject.namespace);
    }
    match subject.relation.as_deref() {
        Some(relation) if relation != "..." => format!("{}#{relation}", subject.namespace),
        _ => subject.namespace.clone(),
    }
}

fn rewrite_source(
    definition: &str,
    permission: &str,
    rewrite: &Rewrite,
) -> Result<String, GenerateError> {
    let operator = match rewrite {
        Rewrite::Union(_) => " + ",
        Rewrite::Intersection(_) => " & ",
        Rewrite::Exclusion(_) => " - ",
    };
    let children = rewrite.children();
    if children.is_empty() {
        return Err(GenerateError::EmptyRewrite {
            definition: definition.to_string(),
            permission: permission.to_string(),
        });
    }

    let parts = children
        .iter()
        .map(|child| child_source(definition, permission, child))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(operator))
}

fn child_source(
    definition: &str,
    permission: &str,
    child: &RewriteChild,
) -> Result<String, GenerateError> {
    match child {
        RewriteChild::This => Err(GenerateError::LegacyThis {
            definition: definition.to_string(),
            permission: permission.to_string(),
        }),
        RewriteChild::Nil => Ok("nil".to_string()),
        RewriteChild::Computed(name) => Ok(name.clone()),
        RewriteChild::TupleToUserset { tupleset, computed } => {
            Ok(format!("{tupleset}->{computed}"))
        }
        RewriteChild::Nested(nested) => {
            let inner = rewrite_source(definition, permission, nested)?;
            if nested.children().len() > 1 {
                Ok(format!("({inner})"))
            } else {
                Ok(inner)
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
