//! Decide between inserting and updating a directory record, and compute the
//! minimal set of attribute replacements for an update.

use super::{DirectoryEntry, Field, StaffProfile};

/// One attribute to write. An empty `value` on an update clears the attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub field: Field,
    pub value: String,
}

impl Change {
    fn new(field: Field, value: String) -> Self {
        Self { field, value }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcilePlan {
    /// No stored record: create it with every populated attribute.
    Insert { attributes: Vec<Change> },
    /// Stored record exists: replace only what differs.
    Update { changes: Vec<Change> },
}

impl ReconcilePlan {
    #[must_use]
    pub fn is_insert(&self) -> bool {
        matches!(self, Self::Insert { .. })
    }

    #[must_use]
    pub fn changes(&self) -> &[Change] {
        match self {
            Self::Insert { attributes } => attributes,
            Self::Update { changes } => changes,
        }
    }

    #[must_use]
    pub fn get(&self, field: Field) -> Option<&str> {
        self.changes()
            .iter()
            .find(|change| change.field == field)
            .map(|change| change.value.as_str())
    }

    #[must_use]
    pub fn contains(&self, field: Field) -> bool {
        self.get(field).is_some()
    }
}

/// Fields a valid record always carries, even when blank.
const REQUIRED: [Field; 5] = [
    Field::Uid,
    Field::Surname,
    Field::GivenName,
    Field::CommonName,
    Field::Email,
];

const OPTIONAL: [Field; 8] = [
    Field::Nickname,
    Field::Mobile,
    Field::EmployeeNumber,
    Field::EmployeeType,
    Field::Gender,
    Field::Birthday,
    Field::Description,
    Field::AvatarPath,
];

/// Replaced whenever the desired value differs, including to blank.
const PROFILE_TRACKED: [Field; 8] = [
    Field::Surname,
    Field::GivenName,
    Field::CommonName,
    Field::Email,
    Field::Mobile,
    Field::AvatarPath,
    Field::Birthday,
    Field::Description,
];

const ADMINISTRATIVE: [Field; 2] = [Field::EmployeeNumber, Field::EmployeeType];

#[must_use]
pub fn reconcile(existing: Option<&DirectoryEntry>, desired: &StaffProfile) -> ReconcilePlan {
    match existing {
        None => ReconcilePlan::Insert {
            attributes: insert_attributes(desired),
        },
        Some(entry) => {
            let mut changes = profile_changes(entry, desired);
            changes.extend(administrative_changes(entry, desired));
            ReconcilePlan::Update { changes }
        }
    }
}

/// Update plan for a self-service edit. Employee number and type are left
/// to administrators and never appear in it.
#[must_use]
pub fn reconcile_profile(existing: &DirectoryEntry, desired: &StaffProfile) -> ReconcilePlan {
    ReconcilePlan::Update {
        changes: profile_changes(existing, desired),
    }
}

fn insert_attributes(desired: &StaffProfile) -> Vec<Change> {
    let required = REQUIRED
        .iter()
        .map(|&field| Change::new(field, desired.value(field)));
    // Gender::Unknown renders as "", so it drops out with the other blanks.
    let optional = OPTIONAL
        .iter()
        .map(|&field| Change::new(field, desired.value(field)))
        .filter(|change| !change.value.is_empty());
    required.chain(optional).collect()
}

fn profile_changes(entry: &DirectoryEntry, desired: &StaffProfile) -> Vec<Change> {
    let mut changes: Vec<Change> = PROFILE_TRACKED
        .iter()
        .filter_map(|&field| differing(entry, desired, field))
        .collect();

    // Display name and gender are never cleared from here.
    if !desired.nickname.is_empty() {
        changes.extend(differing(entry, desired, Field::Nickname));
    }
    if desired.gender.is_known() {
        changes.extend(differing(entry, desired, Field::Gender));
    }
    changes
}

/// Employee number and type are administratively controlled and often blank
/// on the first write; they follow the same only-if-different rule on their
/// own.
fn administrative_changes(entry: &DirectoryEntry, desired: &StaffProfile) -> Vec<Change> {
    ADMINISTRATIVE
        .iter()
        .filter_map(|&field| differing(entry, desired, field))
        .collect()
}

fn differing(entry: &DirectoryEntry, desired: &StaffProfile, field: Field) -> Option<Change> {
    let value = desired.value(field);
    if field == Field::Gender {
        // Stored codes may differ in case ("M" vs "m").
        let stored = super::Gender::from_code(entry.get(field));
        return (stored != desired.gender).then(|| Change::new(field, value));
    }
    (value != entry.get(field)).then(|| Change::new(field, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Gender;

    const DN: &str = "uid=alice,ou=people,dc=example,dc=org";

    fn alice() -> StaffProfile {
        StaffProfile {
            uid: "alice".to_string(),
            surname: "Lee".to_string(),
            given_name: "Alice".to_string(),
            email: "a@x.com".to_string(),
            ..StaffProfile::default()
        }
    }

    fn stored_alice() -> DirectoryEntry {
        DirectoryEntry::new(DN)
            .with(Field::Uid, "alice")
            .with(Field::Surname, "Lee")
            .with(Field::GivenName, "Alice")
            .with(Field::CommonName, "Alice Lee")
            .with(Field::Email, "a@x.com")
    }

    #[test]
    fn absent_entry_yields_insert_with_required_fields() {
        let plan = reconcile(None, &alice());
        assert!(plan.is_insert());
        assert_eq!(plan.get(Field::Uid), Some("alice"));
        assert_eq!(plan.get(Field::Surname), Some("Lee"));
        assert_eq!(plan.get(Field::GivenName), Some("Alice"));
        assert_eq!(plan.get(Field::CommonName), Some("Alice Lee"));
        assert_eq!(plan.get(Field::Email), Some("a@x.com"));
        assert!(!plan.contains(Field::Gender));
        assert_eq!(plan.changes().len(), 5);
    }

    #[test]
    fn insert_keeps_required_fields_even_when_blank() {
        let profile = StaffProfile {
            uid: "ghost".to_string(),
            ..StaffProfile::default()
        };
        let plan = reconcile(None, &profile);
        assert_eq!(plan.get(Field::Email), Some(""));
        assert_eq!(plan.get(Field::Surname), Some(""));
        assert!(!plan.contains(Field::Mobile));
    }

    #[test]
    fn insert_attaches_populated_optionals() {
        let profile = StaffProfile {
            nickname: "ally".to_string(),
            mobile: "111".to_string(),
            gender: Gender::Female,
            employee_number: "E-7".to_string(),
            ..alice()
        };
        let plan = reconcile(None, &profile);
        assert_eq!(plan.get(Field::Nickname), Some("ally"));
        assert_eq!(plan.get(Field::Mobile), Some("111"));
        assert_eq!(plan.get(Field::Gender), Some("f"));
        assert_eq!(plan.get(Field::EmployeeNumber), Some("E-7"));
        assert!(!plan.contains(Field::EmployeeType));
    }

    #[test]
    fn unchanged_profile_yields_empty_update() {
        let plan = reconcile(Some(&stored_alice()), &alice());
        assert_eq!(plan, ReconcilePlan::Update { changes: vec![] });
    }

    #[test]
    fn unchanged_mobile_is_omitted() {
        let entry = stored_alice().with(Field::Mobile, "111");
        let desired = StaffProfile {
            mobile: "111".to_string(),
            description: "ops".to_string(),
            ..alice()
        };
        let plan = reconcile(Some(&entry), &desired);
        assert!(!plan.contains(Field::Mobile));
        assert_eq!(plan.get(Field::Description), Some("ops"));
    }

    #[test]
    fn cleared_mobile_is_replaced_with_blank() {
        let entry = stored_alice().with(Field::Mobile, "111");
        let plan = reconcile(Some(&entry), &alice());
        assert_eq!(plan.get(Field::Mobile), Some(""));
    }

    #[test]
    fn blank_nickname_never_clears_display_name() {
        let entry = stored_alice().with(Field::Nickname, "ally");
        let plan = reconcile(Some(&entry), &alice());
        assert!(!plan.contains(Field::Nickname));

        let renamed = StaffProfile {
            nickname: "al".to_string(),
            ..alice()
        };
        let plan = reconcile(Some(&entry), &renamed);
        assert_eq!(plan.get(Field::Nickname), Some("al"));
    }

    #[test]
    fn unknown_gender_never_written() {
        let entry = stored_alice().with(Field::Gender, "f");
        let plan = reconcile(Some(&entry), &alice());
        assert!(!plan.contains(Field::Gender));
        assert!(!reconcile(None, &alice()).contains(Field::Gender));
    }

    #[test]
    fn known_gender_written_when_different() {
        let entry = stored_alice().with(Field::Gender, "M");
        let same = StaffProfile {
            gender: Gender::Male,
            ..alice()
        };
        assert!(!reconcile(Some(&entry), &same).contains(Field::Gender));

        let changed = StaffProfile {
            gender: Gender::Female,
            ..alice()
        };
        assert_eq!(reconcile(Some(&entry), &changed).get(Field::Gender), Some("f"));
    }

    #[test]
    fn common_name_compared_in_derived_form() {
        // Blank common name derives to the stored "Alice Lee".
        let plan = reconcile(Some(&stored_alice()), &alice());
        assert!(!plan.contains(Field::CommonName));

        let renamed = StaffProfile {
            given_name: "Alicia".to_string(),
            ..alice()
        };
        let plan = reconcile(Some(&stored_alice()), &renamed);
        assert_eq!(plan.get(Field::GivenName), Some("Alicia"));
        assert_eq!(plan.get(Field::CommonName), Some("Alicia Lee"));
    }

    #[test]
    fn administrative_fields_follow_only_if_different() {
        let entry = stored_alice()
            .with(Field::EmployeeNumber, "E-1")
            .with(Field::EmployeeType, "staff");
        let desired = StaffProfile {
            employee_number: "E-1".to_string(),
            employee_type: "contractor".to_string(),
            ..alice()
        };
        let plan = reconcile(Some(&entry), &desired);
        assert!(!plan.contains(Field::EmployeeNumber));
        assert_eq!(plan.get(Field::EmployeeType), Some("contractor"));
    }

    #[test]
    fn self_service_plan_skips_administrative_fields() {
        let entry = stored_alice()
            .with(Field::EmployeeNumber, "E-1")
            .with(Field::EmployeeType, "staff");
        let desired = StaffProfile {
            employee_type: "admin".to_string(),
            description: "ops".to_string(),
            ..alice()
        };
        let plan = reconcile_profile(&entry, &desired);
        assert!(!plan.is_insert());
        assert!(!plan.contains(Field::EmployeeNumber));
        assert!(!plan.contains(Field::EmployeeType));
        assert_eq!(plan.get(Field::Description), Some("ops"));
    }

    #[test]
    fn uid_is_never_part_of_an_update() {
        let desired = StaffProfile {
            uid: "mallory".to_string(),
            ..alice()
        };
        assert!(!reconcile(Some(&stored_alice()), &desired).contains(Field::Uid));
    }

    #[test]
    fn update_never_repeats_stored_values() {
        let entry = stored_alice()
            .with(Field::Mobile, "111")
            .with(Field::Birthday, "1990-01-01")
            .with(Field::AvatarPath, "/a.png")
            .with(Field::Gender, "f");
        let desired = StaffProfile {
            mobile: "111".to_string(),
            birthday: "1991-02-02".to_string(),
            avatar_path: "/a.png".to_string(),
            gender: Gender::Female,
            nickname: "ally".to_string(),
            ..alice()
        };
        let plan = reconcile(Some(&entry), &desired);
        for change in plan.changes() {
            assert_ne!(
                entry.get(change.field),
                change.value,
                "{:?} should not be rewritten",
                change.field
            );
        }
        assert_eq!(plan.changes().len(), 2);
    }
}
