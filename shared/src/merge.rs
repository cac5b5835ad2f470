//! Refreshing embedded profile copies from the user registry.

use serde::Serialize;

use crate::types::{keys, CanonicalUser, EmbeddedReference};
use crate::value::{values_equal, Fields, Value};

/// Result of reconciling one embedded reference.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The reference to store. Sanitized whenever a matching user was found.
    pub merged: Value,
    pub changed: bool,
}

fn truthy(value: &Option<String>) -> Option<&String> {
    value.as_ref().filter(|s| !s.is_empty())
}

/// `a || b || ... || z`: the first truthy candidate, else the last one.
fn first_truthy(candidates: &[Option<&Value>]) -> Value {
    candidates
        .iter()
        .flatten()
        .find(|v| v.is_truthy())
        .copied()
        .or_else(|| candidates.last().copied().flatten())
        .cloned()
        .unwrap_or_default()
}

fn into_fields(value: Value) -> Fields {
    match value {
        Value::Object(fields) => fields,
        _ => Fields::new(),
    }
}

/// Fields copied as `user[key] || entry[key]`.
const REFRESHED: [&str; 9] = [
    keys::PHOTO,
    keys::EMAIL,
    keys::SPECIALIZATION,
    keys::EDUCATION,
    keys::CONTACT,
    keys::PERSONAL_EMAIL,
    keys::WEBSITES,
    keys::MEMBER_TYPE,
    keys::HOME_DEPARTMENT,
];

/// Reconciles `entry` against the current user snapshot.
///
/// Registry values win when truthy; otherwise the stored copy is kept as it
/// is, `null` included. Values of unexpected types take part like any other.
/// An entry without an identifier, or whose user is not in `users`, comes
/// back as-is with `changed == false`.
pub fn merge_reference(entry: &EmbeddedReference, users: &[CanonicalUser]) -> MergeOutcome {
    let unchanged = || MergeOutcome {
        merged: entry.to_value(),
        changed: false,
    };

    let Some(id) = entry.identifier() else {
        return unchanged();
    };
    let Some(user) = users.iter().find(|u| u.id == id) else {
        return unchanged();
    };

    let stored = into_fields(entry.to_value());
    let current = into_fields(user.to_value());
    let mut merged = stored.clone();
    let mut set = |key: &str, value: Value| {
        merged.insert(key.to_string(), value);
    };

    set(keys::NAME, first_truthy(&[current.get(keys::FULL_NAME), stored.get(keys::NAME)]));
    set(
        keys::FULL_NAME,
        first_truthy(&[
            current.get(keys::FULL_NAME),
            stored.get(keys::FULL_NAME),
            stored.get(keys::NAME),
        ]),
    );
    for key in REFRESHED {
        set(key, first_truthy(&[current.get(key), stored.get(key)]));
    }
    set(
        keys::EDUCATION_HTML,
        first_truthy(&[
            current.get(keys::EDUCATION_HTML),
            current.get(keys::EDUCATION),
            stored.get(keys::EDUCATION_HTML),
            stored.get(keys::EDUCATION),
        ]),
    );
    // Nullish: only a missing or null status falls back.
    let status = current
        .get(keys::STATUS)
        .filter(|s| !s.is_nullish())
        .or(stored.get(keys::STATUS))
        .cloned()
        .unwrap_or_default();
    set(keys::STATUS, status);

    let merged = Value::Object(merged).sanitized();
    let original = Value::Object(stored).sanitized();
    let changed = !values_equal(&merged, &original);

    MergeOutcome { merged, changed }
}

// ========== PREVIEW ==========
/// Context attached to a preview beyond the merged profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewExtra {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department_name: Option<String>,
}

/// Read-only profile shown in the detail view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfilePreview {
    #[serde(flatten)]
    pub extra: PreviewExtra,
    pub profile: EmbeddedReference,
}

/// `a ?? b` for optional strings.
fn or_set(preferred: Option<String>, fallback: &Option<String>) -> Option<String> {
    preferred.or_else(|| fallback.clone())
}

/// One-shot merge for display. No change detection and no write.
///
/// Names prefer the roster copy, everything else prefers the registry. Text
/// fields the view always renders default to an empty string.
pub fn build_preview(
    profile: &EmbeddedReference,
    user: Option<&CanonicalUser>,
    extra: PreviewExtra,
) -> ProfilePreview {
    let user_full_name = user.and_then(|u| u.full_name.clone());
    let from_user = |f: fn(&CanonicalUser) -> Option<String>| user.and_then(f);

    let full_name = truthy(&profile.full_name)
        .or(truthy(&profile.name))
        .or(truthy(&user_full_name))
        .cloned()
        .unwrap_or_default();
    let name = truthy(&profile.name)
        .or(truthy(&user_full_name))
        .or(truthy(&profile.full_name))
        .cloned()
        .unwrap_or_default();

    let education_html = from_user(|u| u.education_html.clone())
        .or_else(|| from_user(|u| u.education.clone()))
        .or_else(|| profile.education_html.clone())
        .or_else(|| profile.education.clone())
        .unwrap_or_default();

    let merged = EmbeddedReference {
        name: Some(name),
        full_name: Some(full_name),
        specialization: Some(
            or_set(from_user(|u| u.specialization.clone()), &profile.specialization).unwrap_or_default(),
        ),
        contact: Some(or_set(from_user(|u| u.contact.clone()), &profile.contact).unwrap_or_default()),
        personal_email: Some(
            or_set(from_user(|u| u.personal_email.clone()), &profile.personal_email).unwrap_or_default(),
        ),
        education_html: Some(education_html),
        websites: Some(
            user.and_then(|u| u.websites.clone())
                .or_else(|| profile.websites.clone())
                .unwrap_or_default(),
        ),
        member_type: or_set(from_user(|u| u.member_type.clone()), &profile.member_type),
        home_department: or_set(from_user(|u| u.home_department.clone()), &profile.home_department),
        ..profile.clone()
    };

    ProfilePreview {
        extra,
        profile: merged,
    }
}
