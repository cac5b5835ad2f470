//! Editable about and admission page sections.
//!
//! Each page is a collection of fixed section documents plus two optional
//! extras. Extras (and the undergraduate admission section) can be hidden
//! from the public site; that switch is stored twice, as a flag on
//! `settings/public_flags` and as `isVisible` on the section itself.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RosterError};
use crate::navbar::editor_visibility;
use crate::store::DocumentStore;
use crate::types::{DocumentPath, ABOUT_SECTIONS, ADMISSION_SECTIONS, PUBLIC_FLAGS_ID, SETTINGS};
use crate::value::{Fields, Value};

pub const EXTRA_SECTION_IDS: [&str; 2] = ["extra_section_1", "extra_section_2"];
pub const UNDERGRAD_FLAG: &str = "admissionUndergradVisible";
const UNDERGRADUATE: &str = "undergraduate";
const DEFAULT_ORDER: i64 = 999;

const ABOUT_IDS: [&str; 4] = ["the_college", "facilities", "history", "map_location"];
const ADMISSION_IDS: [&str; 3] = ["why_choose_vsu", UNDERGRADUATE, "graduate"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    About,
    Admission,
}

impl SectionKind {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "about" => Some(Self::About),
            "admission" => Some(Self::Admission),
            _ => None,
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::About => "about",
            Self::Admission => "admission",
        }
    }

    pub fn collection(&self) -> &'static str {
        match self {
            Self::About => ABOUT_SECTIONS,
            Self::Admission => ADMISSION_SECTIONS,
        }
    }

    /// Fixed sections first, then the extras, in page order.
    pub fn section_ids(&self) -> Vec<&'static str> {
        let fixed: &[&'static str] = match self {
            Self::About => &ABOUT_IDS,
            Self::Admission => &ADMISSION_IDS,
        };
        fixed.iter().chain(EXTRA_SECTION_IDS.iter()).copied().collect()
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.section_ids().contains(&id)
    }

    /// Whether the public site can hide this section.
    pub fn has_visibility_toggle(&self, id: &str) -> bool {
        is_extra(id) || (*self == Self::Admission && id == UNDERGRADUATE)
    }

    /// Key of the section's switch on the public flags document.
    pub fn flag_key(&self, id: &str) -> String {
        match self {
            Self::Admission if id == UNDERGRADUATE => UNDERGRAD_FLAG.to_string(),
            _ => format!("{}_{}", self.prefix(), id),
        }
    }

    pub fn path(&self, id: &str) -> DocumentPath {
        DocumentPath::new(self.collection(), id)
    }
}

pub fn is_extra(id: &str) -> bool {
    EXTRA_SECTION_IDS.contains(&id)
}

pub fn flags_path() -> DocumentPath {
    DocumentPath::new(SETTINGS, PUBLIC_FLAGS_ID)
}

fn updated_at() -> Value {
    Value::String(chrono::Utc::now().to_rfc3339())
}

fn text(fields: &Fields, key: &str) -> String {
    fields.get(key).and_then(Value::as_str).unwrap_or("").to_string()
}

/// Editor form of one section. Missing or non-text fields read as `""`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SectionForm {
    pub title: String,
    pub cover_image_url: String,
    pub content: String,
    pub video_url: String,
}

impl SectionForm {
    pub fn from_fields(fields: &Fields) -> Self {
        Self {
            title: text(fields, "title"),
            cover_image_url: text(fields, "coverImageUrl"),
            content: text(fields, "content"),
            video_url: text(fields, "videoUrl"),
        }
    }

    pub fn is_dirty(&self, baseline: &Self) -> bool {
        self != baseline
    }
}

/// An extra section as listed in the editor's section picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraSection {
    pub id: String,
    pub title: String,
    pub order: i64,
}

/// Creates any missing section document of `kind` with empty content and its
/// page position as `order`. Returns the ids it created.
pub async fn ensure_sections<S: DocumentStore + ?Sized>(store: &S, kind: SectionKind) -> Result<Vec<String>> {
    let mut created = Vec::new();
    for (index, id) in kind.section_ids().into_iter().enumerate() {
        let path = kind.path(id);
        if store.read_once(&path).await?.is_some() {
            continue;
        }

        let mut fields = Fields::new();
        for key in ["title", "coverImageUrl", "content", "videoUrl"] {
            fields.insert(key.to_string(), Value::from(""));
        }
        fields.insert("order".to_string(), Value::Number(index.into()));
        fields.insert("updatedAt".to_string(), updated_at());
        store.upsert(&path, fields).await?;

        tracing::info!("Created missing section {}", path);
        created.push(id.to_string());
    }
    Ok(created)
}

pub async fn load_section<S: DocumentStore + ?Sized>(store: &S, kind: SectionKind, id: &str) -> Result<SectionForm> {
    Ok(store
        .read_once(&kind.path(id))
        .await?
        .map(|fields| SectionForm::from_fields(&fields))
        .unwrap_or_default())
}

/// Saves cover, body and video, creating the document if needed. The title
/// is only part of the payload for extras; fixed sections keep theirs.
pub async fn save_section<S: DocumentStore + ?Sized>(
    store: &S,
    kind: SectionKind,
    id: &str,
    form: &SectionForm,
) -> Result<()> {
    let mut fields = Fields::new();
    fields.insert("coverImageUrl".to_string(), Value::from(form.cover_image_url.as_str()));
    fields.insert("content".to_string(), Value::from(form.content.as_str()));
    fields.insert("videoUrl".to_string(), Value::from(form.video_url.as_str()));
    if is_extra(id) {
        fields.insert("title".to_string(), Value::from(form.title.as_str()));
    }
    fields.insert("updatedAt".to_string(), updated_at());

    store.upsert(&kind.path(id), fields).await
}

/// Renames an existing section. Fails with `NotFound` when it does not exist.
pub async fn save_title<S: DocumentStore + ?Sized>(store: &S, kind: SectionKind, id: &str, title: &str) -> Result<()> {
    let mut fields = Fields::new();
    fields.insert("title".to_string(), Value::from(title));
    fields.insert("updatedAt".to_string(), updated_at());
    store.write_partial(&kind.path(id), fields).await
}

/// Whether the section is shown on the public site, as the editor sees it.
///
/// Sections without a toggle are always shown. A failed read is logged and
/// treated as shown.
pub async fn load_visibility<S: DocumentStore + ?Sized>(store: &S, kind: SectionKind, id: &str) -> bool {
    if !kind.has_visibility_toggle(id) {
        return true;
    }

    let docs = async {
        let flags = store.read_once(&flags_path()).await?;
        let section = store.read_once(&kind.path(id)).await?;
        Ok::<_, RosterError>((flags, section))
    };
    match docs.await {
        Ok((flags, section)) => editor_visibility(
            flags.as_ref().and_then(|f| f.get(&kind.flag_key(id))),
            section.as_ref().and_then(|s| s.get("isVisible")),
        ),
        Err(e) => {
            tracing::error!("Failed to load visibility of {}: {}", kind.path(id), e);
            true
        }
    }
}

/// Stores the switch on the flags document, then on the section.
pub async fn save_visibility<S: DocumentStore + ?Sized>(
    store: &S,
    kind: SectionKind,
    id: &str,
    visible: bool,
) -> Result<()> {
    if !kind.has_visibility_toggle(id) {
        return Err(RosterError::Malformed(format!("section {} cannot be hidden", id)));
    }

    let mut flags = Fields::new();
    flags.insert(kind.flag_key(id), Value::Bool(visible));
    flags.insert("updatedAt".to_string(), updated_at());
    store.upsert(&flags_path(), flags).await?;

    let mut section = Fields::new();
    section.insert("isVisible".to_string(), Value::Bool(visible));
    section.insert("updatedAt".to_string(), updated_at());
    store.upsert(&kind.path(id), section).await
}

/// Extras of `kind` sorted by `order`; a missing order sorts last.
pub async fn extra_sections<S: DocumentStore + ?Sized>(store: &S, kind: SectionKind) -> Result<Vec<ExtraSection>> {
    let mut extras: Vec<ExtraSection> = store
        .list(kind.collection())
        .await?
        .into_iter()
        .filter(|(id, _)| is_extra(id))
        .map(|(id, fields)| {
            let order = match fields.get("order") {
                Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
                _ => None,
            };
            ExtraSection {
                title: text(&fields, "title"),
                order: order.unwrap_or(DEFAULT_ORDER),
                id,
            }
        })
        .collect();
    extras.sort_by_key(|e| e.order);
    Ok(extras)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        Value::from(v).as_object().cloned().unwrap()
    }

    #[test]
    fn test_flag_keys() {
        assert_eq!(SectionKind::About.flag_key("extra_section_1"), "about_extra_section_1");
        assert_eq!(SectionKind::Admission.flag_key("extra_section_2"), "admission_extra_section_2");
        assert_eq!(SectionKind::Admission.flag_key("undergraduate"), UNDERGRAD_FLAG);
        assert_eq!(SectionKind::About.flag_key("undergraduate"), "about_undergraduate");
    }

    #[test]
    fn test_visibility_toggles() {
        assert!(SectionKind::About.has_visibility_toggle("extra_section_2"));
        assert!(!SectionKind::About.has_visibility_toggle("history"));
        assert!(SectionKind::Admission.has_visibility_toggle("undergraduate"));
        assert!(!SectionKind::Admission.has_visibility_toggle("graduate"));
    }

    #[test]
    fn test_form_reads_missing_as_empty() {
        let form = SectionForm::from_fields(&fields(json!({"title": "History", "content": null, "order": 2})));
        assert_eq!(form.title, "History");
        assert_eq!(form.content, "");
        assert_eq!(form.video_url, "");

        let mut edited = form.clone();
        assert!(!edited.is_dirty(&form));
        edited.video_url = "https://video".into();
        assert!(edited.is_dirty(&form));
    }

    #[tokio::test]
    async fn test_ensure_sections_fills_gaps_only() {
        let store = MemoryStore::new();
        store.put(&SectionKind::About.path("history"), fields(json!({"title": "Our History", "order": 2})));

        let created = ensure_sections(&store, SectionKind::About).await.unwrap();
        assert_eq!(
            created,
            vec!["the_college", "facilities", "map_location", "extra_section_1", "extra_section_2"]
        );

        let history = store.get(&SectionKind::About.path("history")).unwrap();
        assert_eq!(history["title"], Value::from("Our History"));
        let extra = store.get(&SectionKind::About.path("extra_section_2")).unwrap();
        assert_eq!(extra["order"], Value::from(json!(5)));
        assert_eq!(extra["content"], Value::from(""));

        assert!(ensure_sections(&store, SectionKind::About).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_section_writes_title_for_extras_only() {
        let store = MemoryStore::new();
        let form = SectionForm {
            title: "Renamed".into(),
            content: "<p>Body</p>".into(),
            ..Default::default()
        };

        save_section(&store, SectionKind::Admission, "graduate", &form).await.unwrap();
        save_section(&store, SectionKind::Admission, "extra_section_1", &form).await.unwrap();

        let graduate = store.get(&SectionKind::Admission.path("graduate")).unwrap();
        assert!(!graduate.contains_key("title"));
        assert_eq!(graduate["content"], Value::from("<p>Body</p>"));
        assert!(graduate["updatedAt"].as_str().is_some());

        let extra = load_section(&store, SectionKind::Admission, "extra_section_1").await.unwrap();
        assert_eq!(extra.title, "Renamed");
    }

    #[tokio::test]
    async fn test_save_title_requires_document() {
        let store = MemoryStore::new();
        let err = save_title(&store, SectionKind::About, "history", "History").await.unwrap_err();
        assert!(matches!(err, RosterError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_visibility_flag_wins_in_editor() {
        let store = MemoryStore::new();
        store.put(&flags_path(), fields(json!({"about_extra_section_1": false, "admissionUndergradVisible": null})));
        store.put(&SectionKind::About.path("extra_section_1"), fields(json!({"isVisible": true})));
        store.put(&SectionKind::Admission.path("undergraduate"), fields(json!({"isVisible": false})));

        assert!(!load_visibility(&store, SectionKind::About, "extra_section_1").await);
        assert!(!load_visibility(&store, SectionKind::Admission, "undergraduate").await);
        assert!(load_visibility(&store, SectionKind::About, "extra_section_2").await);
        assert!(load_visibility(&store, SectionKind::Admission, "graduate").await);

        store.fail_reads(Some("offline"));
        assert!(load_visibility(&store, SectionKind::About, "extra_section_1").await);
    }

    #[tokio::test]
    async fn test_save_visibility_writes_both_switches() {
        let store = MemoryStore::new();
        save_visibility(&store, SectionKind::Admission, "undergraduate", false).await.unwrap();

        assert_eq!(store.get(&flags_path()).unwrap()[UNDERGRAD_FLAG], Value::Bool(false));
        assert_eq!(
            store.get(&SectionKind::Admission.path("undergraduate")).unwrap()["isVisible"],
            Value::Bool(false)
        );
        assert!(!load_visibility(&store, SectionKind::Admission, "undergraduate").await);

        let err = save_visibility(&store, SectionKind::About, "history", false).await.unwrap_err();
        assert!(matches!(err, RosterError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_extra_sections_sorted_by_order() {
        let store = MemoryStore::new();
        store.put(&SectionKind::About.path("extra_section_1"), fields(json!({"title": "Alumni"})));
        store.put(&SectionKind::About.path("extra_section_2"), fields(json!({"title": "Partners", "order": 5})));
        store.put(&SectionKind::About.path("history"), fields(json!({"title": "History", "order": 2})));

        let extras = extra_sections(&store, SectionKind::About).await.unwrap();
        let ids: Vec<&str> = extras.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["extra_section_2", "extra_section_1"]);
        assert_eq!(extras[1].order, DEFAULT_ORDER);
    }
}
