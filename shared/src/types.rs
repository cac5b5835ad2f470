use serde::{Serialize, Serializer};
use std::fmt;

use crate::value::{Fields, Value};

// ========== COLLECTIONS ==========
pub const USERS: &str = "users";
pub const DEPARTMENTS: &str = "departments";
pub const COLLEGE_FACULTY_STAFF: &str = "college_faculty_staff";
pub const COLLEGE_WIDE_ID: &str = "college-wide";
pub const SETTINGS: &str = "settings";
pub const PUBLIC_FLAGS_ID: &str = "public_flags";
pub const ABOUT_SECTIONS: &str = "about_sections";
pub const ADMISSION_SECTIONS: &str = "admission_sections";

// ========== PUBLISHED CONTENT ==========
pub const NEWS: &str = "news";
pub const EVENTS: &str = "events";
pub const DOWNLOADS: &str = "downloads";
pub const RESEARCHES: &str = "researches";

// ========== ROLES ==========
pub const ROLE_SUPER_ADMIN: &str = "Super Admin";
pub const ROLE_HEAD_ADMIN: &str = "Head Admin";

/// Stored field names shared by user records and their embedded copies.
pub mod keys {
    pub const ID: &str = "id";
    pub const ROLE: &str = "role";
    pub const NAME: &str = "name";
    pub const FULL_NAME: &str = "fullName";
    pub const PHOTO: &str = "photo";
    pub const EMAIL: &str = "email";
    pub const SPECIALIZATION: &str = "specialization";
    pub const EDUCATION: &str = "education";
    pub const EDUCATION_HTML: &str = "educationHtml";
    pub const CONTACT: &str = "contact";
    pub const PERSONAL_EMAIL: &str = "personalEmail";
    pub const WEBSITES: &str = "websites";
    pub const STATUS: &str = "status";
    pub const MEMBER_TYPE: &str = "memberType";
    pub const HOME_DEPARTMENT: &str = "homeDepartment";
    pub const DEPARTMENT_ID: &str = "departmentId";
    pub const DEPARTMENTS: &str = "departments";
}

// ========== DOCUMENT PATH ==========
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub collection: String,
    pub id: String,
}

impl DocumentPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    pub fn user(id: &str) -> Self {
        Self::new(USERS, id)
    }

    pub fn department(id: &str) -> Self {
        Self::new(DEPARTMENTS, id)
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

// ========== CANONICAL USER ==========
/// The registry record for one member of the organization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalUser {
    pub id: String,
    pub role: Option<String>,
    pub full_name: Option<String>,
    pub photo: Option<String>,
    pub email: Option<String>,
    pub specialization: Option<String>,
    pub education: Option<String>,
    pub education_html: Option<String>,
    pub contact: Option<String>,
    pub personal_email: Option<String>,
    pub websites: Option<Vec<String>>,
    pub status: Option<Value>,
    pub member_type: Option<String>,
    pub home_department: Option<String>,
    pub department_id: Option<String>,
    /// Fields this crate does not interpret.
    pub extra: Fields,
}

impl CanonicalUser {
    pub fn from_fields(id: &str, fields: &Fields) -> Self {
        let mut r = FieldReader::new(fields);
        // The document key is authoritative; a stored `id` field is ignored.
        r.any(keys::ID);
        Self {
            id: id.to_string(),
            role: r.string(keys::ROLE),
            full_name: r.string(keys::FULL_NAME),
            photo: r.string(keys::PHOTO),
            email: r.string(keys::EMAIL),
            specialization: r.string(keys::SPECIALIZATION),
            education: r.string(keys::EDUCATION),
            education_html: r.string(keys::EDUCATION_HTML),
            contact: r.string(keys::CONTACT),
            personal_email: r.string(keys::PERSONAL_EMAIL),
            websites: r.strings(keys::WEBSITES),
            status: r.any(keys::STATUS),
            member_type: r.string(keys::MEMBER_TYPE),
            home_department: r.string(keys::HOME_DEPARTMENT),
            department_id: r.string(keys::DEPARTMENT_ID),
            extra: r.finish(),
        }
    }

    pub fn is_super_admin(&self) -> bool {
        self.role.as_deref() == Some(ROLE_SUPER_ADMIN)
    }

    pub fn to_value(&self) -> Value {
        let mut w = FieldWriter::default();
        w.put(keys::ID, Value::String(self.id.clone()));
        w.put(keys::ROLE, self.role.clone().into());
        w.put(keys::FULL_NAME, self.full_name.clone().into());
        w.put(keys::PHOTO, self.photo.clone().into());
        w.put(keys::EMAIL, self.email.clone().into());
        w.put(keys::SPECIALIZATION, self.specialization.clone().into());
        w.put(keys::EDUCATION, self.education.clone().into());
        w.put(keys::EDUCATION_HTML, self.education_html.clone().into());
        w.put(keys::CONTACT, self.contact.clone().into());
        w.put(keys::PERSONAL_EMAIL, self.personal_email.clone().into());
        w.put(keys::WEBSITES, opt_strings(&self.websites));
        w.put(keys::STATUS, self.status.clone().unwrap_or_default());
        w.put(keys::MEMBER_TYPE, self.member_type.clone().into());
        w.put(keys::HOME_DEPARTMENT, self.home_department.clone().into());
        w.put(keys::DEPARTMENT_ID, self.department_id.clone().into());
        w.finish(&self.extra)
    }
}

impl Serialize for CanonicalUser {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

// ========== EMBEDDED REFERENCE ==========
/// A denormalized copy of a user's profile stored inside a roster document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmbeddedReference {
    pub id: Option<String>,
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub photo: Option<String>,
    pub email: Option<String>,
    pub specialization: Option<String>,
    pub education: Option<String>,
    pub education_html: Option<String>,
    pub contact: Option<String>,
    pub personal_email: Option<String>,
    pub websites: Option<Vec<String>>,
    pub status: Option<Value>,
    pub member_type: Option<String>,
    pub home_department: Option<String>,
    /// Roster-specific context, e.g. a department title.
    pub extra: Fields,
}

impl EmbeddedReference {
    pub fn from_fields(fields: &Fields) -> Self {
        let mut r = FieldReader::new(fields);
        Self {
            id: r.string(keys::ID),
            name: r.string(keys::NAME),
            full_name: r.string(keys::FULL_NAME),
            photo: r.string(keys::PHOTO),
            email: r.string(keys::EMAIL),
            specialization: r.string(keys::SPECIALIZATION),
            education: r.string(keys::EDUCATION),
            education_html: r.string(keys::EDUCATION_HTML),
            contact: r.string(keys::CONTACT),
            personal_email: r.string(keys::PERSONAL_EMAIL),
            websites: r.strings(keys::WEBSITES),
            status: r.any(keys::STATUS),
            member_type: r.string(keys::MEMBER_TYPE),
            home_department: r.string(keys::HOME_DEPARTMENT),
            extra: r.finish(),
        }
    }

    /// `None` when the stored value is not an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(Self::from_fields)
    }

    /// Identifier usable for reconciliation; empty ids count as missing.
    pub fn identifier(&self) -> Option<&str> {
        self.id.as_deref().filter(|id| !id.is_empty())
    }

    /// Every tracked key in a fixed order, unset ones as [`Value::Absent`],
    /// followed by the extra fields.
    pub fn to_value(&self) -> Value {
        let mut w = FieldWriter::default();
        w.put(keys::ID, self.id.clone().into());
        w.put(keys::NAME, self.name.clone().into());
        w.put(keys::FULL_NAME, self.full_name.clone().into());
        w.put(keys::PHOTO, self.photo.clone().into());
        w.put(keys::EMAIL, self.email.clone().into());
        w.put(keys::SPECIALIZATION, self.specialization.clone().into());
        w.put(keys::EDUCATION, self.education.clone().into());
        w.put(keys::EDUCATION_HTML, self.education_html.clone().into());
        w.put(keys::CONTACT, self.contact.clone().into());
        w.put(keys::PERSONAL_EMAIL, self.personal_email.clone().into());
        w.put(keys::WEBSITES, opt_strings(&self.websites));
        w.put(keys::STATUS, self.status.clone().unwrap_or_default());
        w.put(keys::MEMBER_TYPE, self.member_type.clone().into());
        w.put(keys::HOME_DEPARTMENT, self.home_department.clone().into());
        w.finish(&self.extra)
    }
}

impl Serialize for EmbeddedReference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

fn opt_strings(items: &Option<Vec<String>>) -> Value {
    items.clone().map(Value::from).unwrap_or_default()
}

/// Pulls typed fields out of a stored map; whatever is left becomes `extra`.
///
/// A tracked key whose value has an unexpected type stays in the remainder
/// untouched. So does a stored `null`: the slot reads as unset and the
/// writer puts the `null` back on the way out.
struct FieldReader {
    rest: Fields,
}

impl FieldReader {
    fn new(fields: &Fields) -> Self {
        Self {
            rest: fields.clone(),
        }
    }

    fn string(&mut self, key: &str) -> Option<String> {
        match self.rest.get(key) {
            Some(Value::String(_)) => match self.rest.shift_remove(key) {
                Some(Value::String(s)) => Some(s),
                _ => None,
            },
            Some(Value::Absent) => {
                self.rest.shift_remove(key);
                None
            }
            _ => None,
        }
    }

    fn strings(&mut self, key: &str) -> Option<Vec<String>> {
        match self.rest.get(key) {
            Some(Value::Array(items)) => {
                let strings: Option<Vec<String>> = items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect();
                if strings.is_some() {
                    self.rest.shift_remove(key);
                }
                strings
            }
            Some(Value::Absent) => {
                self.rest.shift_remove(key);
                None
            }
            _ => None,
        }
    }

    fn any(&mut self, key: &str) -> Option<Value> {
        self.rest.shift_remove(key).filter(|v| !v.is_absent())
    }

    fn finish(self) -> Fields {
        self.rest
    }
}

#[derive(Default)]
struct FieldWriter {
    fields: Fields,
}

impl FieldWriter {
    fn put(&mut self, key: &str, value: Value) {
        self.fields.insert(key.to_string(), value);
    }

    /// Appends extras; an extra only fills a tracked slot that is unset.
    fn finish(mut self, extra: &Fields) -> Value {
        for (k, v) in extra {
            match self.fields.get(k) {
                Some(existing) if !existing.is_absent() => {}
                _ => {
                    self.fields.insert(k.clone(), v.clone());
                }
            }
        }
        Value::Object(self.fields)
    }
}

// ========== ROSTER ==========
/// Which fields of a roster document hold embedded references.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RosterLayout {
    /// Single-valued primary lead (dean, department head).
    pub primary: Option<&'static str>,
    /// Single-valued secondary lead (secretary).
    pub secondary: Option<&'static str>,
    /// List-valued member fields.
    pub members: &'static [&'static str],
}

impl RosterLayout {
    pub const COLLEGE: Self = Self {
        primary: Some("collegeDean"),
        secondary: Some("collegeSecretary"),
        members: &["departmentHeads", "adminStaff"],
    };

    pub const DEPARTMENT: Self = Self {
        primary: Some("headAdmin"),
        secondary: None,
        members: &["staff"],
    };

    /// Single-valued fields, primary first.
    pub fn leads(&self) -> impl Iterator<Item = &'static str> {
        self.primary.into_iter().chain(self.secondary)
    }
}

/// One roster document: the whole college or a single department.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RosterScope {
    College,
    Department(String),
}

impl RosterScope {
    pub fn path(&self) -> DocumentPath {
        match self {
            RosterScope::College => DocumentPath::new(COLLEGE_FACULTY_STAFF, COLLEGE_WIDE_ID),
            RosterScope::Department(id) => DocumentPath::department(id),
        }
    }

    pub fn layout(&self) -> RosterLayout {
        match self {
            RosterScope::College => RosterLayout::COLLEGE,
            RosterScope::Department(_) => RosterLayout::DEPARTMENT,
        }
    }
}

impl fmt::Display for RosterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RosterScope::College => write!(f, "college"),
            RosterScope::Department(id) => write!(f, "department:{}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(v: serde_json::Value) -> Fields {
        match Value::from(v) {
            Value::Object(f) => f,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_embedded_reference_keeps_unknown_fields() {
        let entry = EmbeddedReference::from_fields(&fields(json!({
            "id": "u1",
            "name": "Ada",
            "title": "Program Chair",
            "contact": 5550100,
        })));

        assert_eq!(entry.identifier(), Some("u1"));
        assert_eq!(entry.contact, None);
        assert_eq!(entry.extra.get("title"), Some(&Value::from("Program Chair")));
        assert_eq!(entry.extra.get("contact"), Some(&Value::from(json!(5550100))));

        let out = serde_json::to_value(&entry).unwrap();
        assert_eq!(out["contact"], json!(5550100));
        assert_eq!(out["title"], json!("Program Chair"));
    }

    #[test]
    fn test_stored_null_written_back_in_place() {
        let entry = EmbeddedReference::from_fields(&fields(json!({
            "id": "u1",
            "photo": null,
            "websites": null,
        })));
        assert_eq!(entry.photo, None);

        let value = entry.to_value();
        let map = value.as_object().unwrap();
        assert!(map["photo"].is_null());
        assert!(map["websites"].is_null());
        assert_eq!(
            value.sanitized().canonical_string(),
            r#"{"id":"u1","photo":null,"websites":null}"#
        );
    }

    #[test]
    fn test_empty_identifier_is_missing() {
        let entry = EmbeddedReference::from_fields(&fields(json!({"id": "", "name": "x"})));
        assert_eq!(entry.identifier(), None);
    }

    #[test]
    fn test_to_value_marks_unset_fields_absent() {
        let entry = EmbeddedReference {
            id: Some("u1".into()),
            ..Default::default()
        };
        let value = entry.to_value();
        let map = value.as_object().unwrap();
        assert!(map["photo"].is_absent());
        assert_eq!(value.absent_path().as_deref(), Some("name"));
        assert_eq!(value.sanitized().canonical_string(), r#"{"id":"u1"}"#);
    }

    #[test]
    fn test_canonical_user_reads_status_null() {
        let user = CanonicalUser::from_fields(
            "u1",
            &fields(json!({"role": "Faculty", "status": null, "websites": ["https://a.edu"]})),
        );
        assert_eq!(user.status, Some(Value::Null));
        assert_eq!(user.websites, Some(vec!["https://a.edu".to_string()]));
        assert!(!user.is_super_admin());
    }

    #[test]
    fn test_scope_paths() {
        assert_eq!(RosterScope::College.path().to_string(), "college_faculty_staff/college-wide");
        assert_eq!(
            RosterScope::Department("cs".into()).path().to_string(),
            "departments/cs"
        );
        assert_eq!(
            RosterLayout::COLLEGE.leads().collect::<Vec<_>>(),
            vec!["collegeDean", "collegeSecretary"]
        );
        assert_eq!(RosterLayout::DEPARTMENT.leads().count(), 1);
    }
}
