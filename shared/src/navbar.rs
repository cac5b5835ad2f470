//! What the public navigation bar shows.

use serde::Serialize;

use crate::sections::{flags_path, SectionKind, EXTRA_SECTION_IDS, UNDERGRAD_FLAG};
use crate::store::DocumentStore;
use crate::types::{DocumentPath, DEPARTMENTS};
use crate::value::{Fields, Value};

pub const FALLBACK_SECTION_LABEL: &str = "Extra Section";
pub const UNNAMED_DEPARTMENT: &str = "Unnamed Dept";

/// Visibility on the public site: the section's own `isVisible` wins over
/// the flag. Any stored value counts, `null` included.
pub fn public_visibility(section: Option<&Value>, flag: Option<&Value>) -> bool {
    let stored = |v: &&Value| !v.is_absent();
    section
        .filter(stored)
        .or(flag.filter(stored))
        .map_or(true, Value::is_truthy)
}

/// Visibility in the section editor: the flag wins over the section, and
/// `null` counts as unset.
pub fn editor_visibility(flag: Option<&Value>, section: Option<&Value>) -> bool {
    let set = |v: &&Value| !v.is_nullish();
    flag.filter(set).or(section.filter(set)).map_or(true, Value::is_truthy)
}

fn title_of(section: Option<&Fields>) -> Option<&str> {
    section.and_then(|s| s.get("title")).and_then(Value::as_str)
}

fn has_title(title: Option<&str>) -> bool {
    title.is_some_and(|t| !t.trim().is_empty())
}

pub fn section_label(title: Option<&str>) -> String {
    match title {
        Some(t) if has_title(Some(t)) => t.to_string(),
        _ => FALLBACK_SECTION_LABEL.to_string(),
    }
}

/// `admissionUndergradVisible`, shown unless set to something falsy.
pub fn undergrad_visible(flags: Option<&Fields>) -> bool {
    flags
        .and_then(|f| f.get(UNDERGRAD_FLAG))
        .filter(|v| !v.is_nullish())
        .map_or(true, Value::is_truthy)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraLink {
    pub id: String,
    pub label: String,
    pub visible: bool,
    /// About extras show whenever visible; admission extras also need a title.
    pub shown: bool,
}

impl ExtraLink {
    pub fn resolve(kind: SectionKind, id: &str, section: Option<&Fields>, flags: Option<&Fields>) -> Self {
        let title = title_of(section);
        let visible = public_visibility(
            section.and_then(|s| s.get("isVisible")),
            flags.and_then(|f| f.get(&kind.flag_key(id))),
        );
        let shown = match kind {
            SectionKind::About => visible,
            SectionKind::Admission => visible && has_title(title),
        };

        Self {
            id: id.to_string(),
            label: section_label(title),
            visible,
            shown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DepartmentLink {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicNavbar {
    pub departments: Vec<DepartmentLink>,
    pub about_extras: Vec<ExtraLink>,
    pub admission_extras: Vec<ExtraLink>,
    pub undergrad_visible: bool,
}

impl PublicNavbar {
    /// Reads departments, flags and extras. Failed reads are logged and
    /// resolve as missing documents.
    pub async fn load<S: DocumentStore + ?Sized>(store: &S) -> Self {
        let departments = match store.list(DEPARTMENTS).await {
            Ok(docs) => docs
                .into_iter()
                .map(|(id, fields)| DepartmentLink {
                    name: fields
                        .get("name")
                        .and_then(Value::as_str)
                        .filter(|n| !n.is_empty())
                        .unwrap_or(UNNAMED_DEPARTMENT)
                        .to_string(),
                    id,
                })
                .collect(),
            Err(e) => {
                tracing::error!("Failed to load departments for navbar: {}", e);
                Vec::new()
            }
        };

        let flags = read_or_none(store, &flags_path()).await;
        let mut about_extras = Vec::new();
        let mut admission_extras = Vec::new();
        for id in EXTRA_SECTION_IDS {
            let about = read_or_none(store, &SectionKind::About.path(id)).await;
            about_extras.push(ExtraLink::resolve(SectionKind::About, id, about.as_ref(), flags.as_ref()));

            let admission = read_or_none(store, &SectionKind::Admission.path(id)).await;
            admission_extras.push(ExtraLink::resolve(
                SectionKind::Admission,
                id,
                admission.as_ref(),
                flags.as_ref(),
            ));
        }

        Self {
            departments,
            about_extras,
            admission_extras,
            undergrad_visible: undergrad_visible(flags.as_ref()),
        }
    }
}

async fn read_or_none<S: DocumentStore + ?Sized>(store: &S, path: &DocumentPath) -> Option<Fields> {
    match store.read_once(path).await {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!("Navbar read of {} failed: {}", path, e);
            None
        }
    }
}
