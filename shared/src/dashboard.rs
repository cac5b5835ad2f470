//! Account, role and published content figures for the administration
//! dashboard.

use serde::Serialize;

use crate::calendar::{as_date, ms_from};
use crate::search::strip_html;
use crate::store::{load_users, DocumentStore};
use crate::types::{CanonicalUser, DEPARTMENTS, DOWNLOADS, EVENTS, NEWS, RESEARCHES};
use crate::value::{Fields, Value};

const FEED_PER_COLLECTION: usize = 4;
const FEED_LIMIT: usize = 8;
const PREVIEW_CHARS: usize = 120;

const SUPER_ADMIN_VARIANTS: [&str; 4] = ["Super Admin", "super_admin", "super admin", "super-admin"];
const HEAD_ADMIN_VARIANTS: [&str; 4] = ["Head Admin", "head_admin", "head admin", "head-admin"];
const FACULTY_VARIANTS: [&str; 2] = ["Faculty", "faculty"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleCounts {
    pub super_admin: usize,
    pub head_admin: usize,
    pub faculty: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleBar {
    pub label: &'static str,
    pub value: usize,
    /// Width relative to the largest bar, 0 to 100.
    pub percent: u32,
}

impl RoleCounts {
    /// Counts users whose role is one of the recognised spellings. Anything
    /// else is not counted.
    pub fn tally(users: &[CanonicalUser]) -> Self {
        users.iter().fold(Self::default(), |mut counts, user| {
            match user.role.as_deref() {
                Some(r) if SUPER_ADMIN_VARIANTS.contains(&r) => counts.super_admin += 1,
                Some(r) if HEAD_ADMIN_VARIANTS.contains(&r) => counts.head_admin += 1,
                Some(r) if FACULTY_VARIANTS.contains(&r) => counts.faculty += 1,
                _ => {}
            }
            counts
        })
    }

    pub fn bars(&self) -> Vec<RoleBar> {
        let entries = [
            ("Super Admin", self.super_admin),
            ("Head Admin", self.head_admin),
            ("Faculty", self.faculty),
        ];
        let largest = entries.iter().map(|(_, v)| *v).max().unwrap_or(0).max(1);

        entries
            .into_iter()
            .map(|(label, value)| RoleBar {
                label,
                value,
                percent: (value as f64 / largest as f64 * 100.0).round() as u32,
            })
            .collect()
    }
}

/// Published documents per content collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ContentCounts {
    pub news: usize,
    pub events: usize,
    pub downloads: usize,
    pub research: usize,
}

/// One entry of the "recently published" feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    /// `collection:id`
    pub key: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub preview: String,
    /// Creation time, RFC 3339.
    pub when: Option<String>,
}

fn is_published(fields: &Fields) -> bool {
    matches!(fields.get("published"), Some(Value::Bool(true)))
}

fn first_text<'a>(fields: &'a Fields, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| fields.get(*k))
        .find(|v| v.is_truthy())
        .and_then(Value::as_str)
}

impl FeedItem {
    pub fn from_document(collection: &str, kind: &'static str, id: &str, fields: &Fields) -> Self {
        let title = first_text(fields, &["title", "name", "fileName", "heading"])
            .map(str::to_string)
            .unwrap_or_else(|| format!("Untitled {}", kind));
        let raw = first_text(fields, &["summary", "excerpt", "description", "content"]).unwrap_or("");

        Self {
            key: format!("{}:{}", collection, id),
            kind,
            title,
            preview: strip_html(raw).trim().chars().take(PREVIEW_CHARS).collect(),
            when: fields.get("createdAt").and_then(as_date).map(|d| d.to_rfc3339()),
        }
    }
}

fn created_ms(fields: &Fields) -> i64 {
    fields.get("createdAt").map_or(0, ms_from)
}

/// Published documents of one collection, newest first.
fn published_newest_first(docs: Vec<(String, Fields)>) -> Vec<(String, Fields)> {
    let mut published: Vec<_> = docs.into_iter().filter(|(_, f)| is_published(f)).collect();
    published.sort_by_key(|(_, f)| std::cmp::Reverse(created_ms(f)));
    published
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_accounts: usize,
    pub total_departments: usize,
    pub roles: RoleCounts,
    pub bars: Vec<RoleBar>,
    pub content: ContentCounts,
    pub recent: Vec<FeedItem>,
}

impl DashboardStats {
    /// Loads both collections. A listing that fails is logged and counted as
    /// empty so the rest of the dashboard still renders.
    pub async fn load<S: DocumentStore + ?Sized>(store: &S) -> Self {
        let users = match load_users(store).await {
            Ok(users) => users,
            Err(e) => {
                tracing::error!("Failed to load users for dashboard: {}", e);
                Vec::new()
            }
        };
        let total_departments = match store.list(DEPARTMENTS).await {
            Ok(docs) => docs.len(),
            Err(e) => {
                tracing::error!("Failed to load departments for dashboard: {}", e);
                0
            }
        };

        let mut content = ContentCounts::default();
        let mut recent = Vec::new();
        for (collection, kind) in [(NEWS, "News"), (EVENTS, "Event"), (DOWNLOADS, "Download"), (RESEARCHES, "Research")] {
            let published = match store.list(collection).await {
                Ok(docs) => published_newest_first(docs),
                Err(e) => {
                    tracing::error!("Failed to load {} for dashboard: {}", collection, e);
                    Vec::new()
                }
            };
            let count = match collection {
                NEWS => &mut content.news,
                EVENTS => &mut content.events,
                DOWNLOADS => &mut content.downloads,
                _ => &mut content.research,
            };
            *count = published.len();
            recent.extend(published.iter().take(FEED_PER_COLLECTION).map(|(id, fields)| {
                (created_ms(fields), FeedItem::from_document(collection, kind, id, fields))
            }));
        }
        recent.sort_by_key(|(created, _)| std::cmp::Reverse(*created));
        recent.truncate(FEED_LIMIT);

        let roles = RoleCounts::tally(&users);
        Self {
            total_accounts: users.len(),
            total_departments,
            bars: roles.bars(),
            roles,
            content,
            recent: recent.into_iter().map(|(_, item)| item).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::DocumentPath;
    use serde_json::json;

    fn with_role(role: &str) -> CanonicalUser {
        CanonicalUser {
            role: Some(role.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_tally_accepts_spelling_variants() {
        let users: Vec<_> = ["Super Admin", "super-admin", "head admin", "Faculty", "faculty", "Registrar"]
            .into_iter()
            .map(with_role)
            .collect();

        let counts = RoleCounts::tally(&users);
        assert_eq!(
            counts,
            RoleCounts {
                super_admin: 2,
                head_admin: 1,
                faculty: 2
            }
        );
    }

    #[test]
    fn test_bars_scale_to_largest() {
        let counts = RoleCounts {
            super_admin: 1,
            head_admin: 2,
            faculty: 3,
        };
        let percents: Vec<u32> = counts.bars().iter().map(|b| b.percent).collect();
        assert_eq!(percents, vec![33, 67, 100]);

        let empty = RoleCounts::default().bars();
        assert!(empty.iter().all(|b| b.percent == 0));
    }

    fn fields(v: serde_json::Value) -> Fields {
        Value::from(v).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_load_counts_collections() {
        let store = MemoryStore::new();
        store.put(&DocumentPath::user("a"), fields(json!({"role": "Faculty"})));
        store.put(&DocumentPath::user("b"), fields(json!({"role": "Head Admin"})));
        store.put(&DocumentPath::department("cs"), fields(json!({"name": "CS"})));

        let stats = DashboardStats::load(&store).await;
        assert_eq!(stats.total_accounts, 2);
        assert_eq!(stats.total_departments, 1);
        assert_eq!(stats.roles.faculty, 1);
        assert_eq!(stats.bars.len(), 3);
    }

    #[test]
    fn test_feed_item_falls_back_through_fields() {
        let doc = fields(json!({
            "title": "",
            "fileName": "handbook.pdf",
            "summary": "",
            "content": "<p>Student <b>handbook</b></p>",
            "createdAt": "2025-01-02T03:04:05Z",
        }));
        let item = FeedItem::from_document(DOWNLOADS, "Download", "d1", &doc);
        assert_eq!(item.key, "downloads:d1");
        assert_eq!(item.title, "handbook.pdf");
        assert!(item.preview.starts_with("Student"));
        assert!(!item.preview.contains('<'));
        assert_eq!(item.when.as_deref(), Some("2025-01-02T03:04:05+00:00"));

        let bare = FeedItem::from_document(RESEARCHES, "Research", "r1", &Fields::new());
        assert_eq!(bare.title, "Untitled Research");
        assert_eq!(bare.when, None);
    }

    #[tokio::test]
    async fn test_load_counts_published_content() {
        let store = MemoryStore::new();
        for day in 1..=6 {
            let created = format!("2025-01-0{}T00:00:00Z", day);
            store.put(
                &DocumentPath::new(NEWS, format!("n{}", day)),
                fields(json!({"title": format!("News {}", day), "published": true, "createdAt": created})),
            );
        }
        store.put(&DocumentPath::new(NEWS, "draft"), fields(json!({"title": "Draft", "published": false})));
        store.put(&DocumentPath::new(EVENTS, "e1"), fields(json!({"title": "Expo", "published": "yes"})));
        store.put(
            &DocumentPath::new(RESEARCHES, "r1"),
            fields(json!({"title": "Paper", "published": true, "createdAt": "2025-01-09T00:00:00Z"})),
        );

        let stats = DashboardStats::load(&store).await;
        assert_eq!(
            stats.content,
            ContentCounts {
                news: 6,
                events: 0,
                downloads: 0,
                research: 1
            }
        );

        let keys: Vec<&str> = stats.recent.iter().map(|i| i.key.as_str()).collect();
        assert_eq!(keys, vec!["researches:r1", "news:n6", "news:n5", "news:n4", "news:n3"]);
    }

    #[tokio::test]
    async fn test_load_survives_failed_listing() {
        let store = MemoryStore::new();
        store.put(&DocumentPath::user("a"), fields(json!({"role": "Faculty"})));
        store.fail_reads(Some("offline"));

        let stats = DashboardStats::load(&store).await;
        assert_eq!(stats.total_accounts, 0);
        assert_eq!(stats.total_departments, 0);
        assert_eq!(stats.content, ContentCounts::default());
        assert!(stats.recent.is_empty());
    }
}
