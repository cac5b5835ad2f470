use crate::error::Result;
use crate::merge::{build_preview, PreviewExtra, ProfilePreview};
use crate::store::DocumentStore;
use crate::types::{keys, CanonicalUser, DocumentPath, EmbeddedReference, RosterScope, ROLE_HEAD_ADMIN};
use crate::value::{Fields, Value};

fn reference_id(value: &Value) -> Option<&str> {
    value.as_object()?.get(keys::ID)?.as_str()
}

/// Takes a user out of a roster.
///
/// A lead slot holding the user is set to `null`; otherwise the first member
/// list containing the user is rewritten without them. Removing someone from
/// a department also drops that department from the user's own record.
/// Returns the roster field that was written, if any.
pub async fn remove_reference<S: DocumentStore + ?Sized>(
    store: &S,
    scope: &RosterScope,
    user_id: &str,
) -> Result<Option<String>> {
    let path = scope.path();
    let Some(doc) = store.read_once(&path).await? else {
        return Ok(None);
    };
    let layout = scope.layout();

    let mut updates = Fields::new();
    if let Some(field) = layout
        .leads()
        .find(|f| doc.get(*f).and_then(reference_id) == Some(user_id))
    {
        updates.insert(field.to_string(), Value::Null);
    } else if let Some((field, items)) = layout.members.iter().find_map(|f| {
        doc.get(*f)
            .and_then(Value::as_array)
            .filter(|items| items.iter().any(|i| reference_id(i) == Some(user_id)))
            .map(|items| (*f, items))
    }) {
        let kept = items
            .iter()
            .filter(|i| reference_id(i) != Some(user_id))
            .cloned()
            .collect();
        updates.insert(field.to_string(), Value::Array(kept));
    }

    let Some(field) = updates.keys().next().cloned() else {
        return Ok(None);
    };
    store.write_partial(&path, updates).await?;
    tracing::info!("Removed {} from {} on {}", user_id, field, path);

    if let RosterScope::Department(department_id) = scope {
        detach_department(store, user_id, department_id).await?;
    }

    Ok(Some(field))
}

async fn detach_department<S: DocumentStore + ?Sized>(
    store: &S,
    user_id: &str,
    department_id: &str,
) -> Result<()> {
    let path = DocumentPath::user(user_id);
    let Some(user) = store.read_once(&path).await? else {
        tracing::warn!("User {} not found while detaching {}", user_id, department_id);
        return Ok(());
    };
    let Some(departments) = user.get(keys::DEPARTMENTS).and_then(Value::as_array) else {
        return Ok(());
    };
    if !departments.iter().any(|d| d.as_str() == Some(department_id)) {
        return Ok(());
    }

    let kept = departments
        .iter()
        .filter(|d| d.as_str() != Some(department_id))
        .cloned()
        .collect();
    let mut updates = Fields::new();
    updates.insert(keys::DEPARTMENTS.to_string(), Value::Array(kept));
    store.write_partial(&path, updates).await
}

/// Builds the detail-view profile for `profile`.
///
/// For a Head Admin with a department, the department's name is looked up
/// once. A failed lookup is logged and the preview is built without it.
pub async fn assemble_preview<S: DocumentStore + ?Sized>(
    store: &S,
    profile: &EmbeddedReference,
    users: &[CanonicalUser],
) -> ProfilePreview {
    let user = profile
        .identifier()
        .and_then(|id| users.iter().find(|u| u.id == id));

    let mut extra = PreviewExtra::default();
    let head_admin_department = user
        .filter(|u| u.role.as_deref() == Some(ROLE_HEAD_ADMIN))
        .and_then(|u| u.department_id.as_deref())
        .filter(|id| !id.is_empty());

    if let Some(department_id) = head_admin_department {
        match store.read_once(&DocumentPath::department(department_id)).await {
            Ok(Some(department)) => {
                extra.role = user.and_then(|u| u.role.clone());
                extra.department_name = Some(
                    department
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Error fetching department name for {}: {}", department_id, e);
            }
        }
    }

    build_preview(profile, user, extra)
}
