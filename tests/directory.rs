use async_trait::async_trait;
use barangay::accounts::{AccountProvider, InMemoryAccountProvider};
use barangay::directory::{
    MUNICIPALITY_SUFFIX, NavSection, Resident, ResidentFilter, ResidentId, ResidentProfile,
    ResidentUpdate, Role, User, UserId, UserUpdate,
};
use barangay::error::{BarangayError, Result};
use barangay::manager::memory::InMemoryStorage;
use barangay::manager::{DirectoryStorage, NewResidentAccount, NewStaffAccount, Storage};
use barangay::objects::{InMemoryObjectStore, ObjectStore};
use barangay::request::{DocumentRequestInput, DocumentType, FeeSchedule};
use chrono::{NaiveDate, Utc};
use uuid::Uuid;

fn profile(first_name: &str, last_name: &str, purok: &str) -> ResidentProfile {
    ResidentProfile {
        first_name: first_name.to_string(),
        middle_name: Some("Lopez".to_string()),
        last_name: last_name.to_string(),
        purok: purok.to_string(),
        birthdate: NaiveDate::from_ymd_opt(1995, 2, 28).unwrap(),
        household_number: None,
        contact_number: Some("09181112222".to_string()),
    }
}

fn account(email: &str, profile: ResidentProfile) -> NewResidentAccount {
    NewResidentAccount {
        email: email.to_string(),
        password: "mabuhay2024".to_string(),
        profile,
    }
}

async fn admin(storage: &InMemoryStorage) -> User {
    let user = User {
        id: UserId(Uuid::new_v4()),
        email: "admin@office.example.com".to_string(),
        name: "Office Admin".to_string(),
        role: Role::Admin,
        resident_id: None,
        created_at: Utc::now(),
    };
    storage.insert_user(&user).await.unwrap();
    user
}

#[test_log::test(tokio::test)]
async fn test_registration_creates_paired_records() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();

    let (user, resident) = storage
        .register_resident(
            &accounts,
            account("  Maria@Example.com ", profile("Maria", "Santos", "Purok 1")),
        )
        .await
        .unwrap();

    assert_eq!(user.email, "maria@example.com");
    assert_eq!(user.role, Role::Resident);
    assert_eq!(user.name, "Maria Santos");
    assert_eq!(user.resident_id, Some(resident.id));
    assert_eq!(resident.user_id, user.id);
    assert_eq!(resident.address, format!("Purok 1, {}", MUNICIPALITY_SUFFIX));
    assert!(resident.display_id.starts_with("RES-"));
    assert_eq!(accounts.account_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_duplicate_email_leaves_no_records() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    storage
        .register_resident(&accounts, account("dup@example.com", profile("Ana", "Cruz", "Purok 1")))
        .await
        .unwrap();

    let err = storage
        .register_resident(&accounts, account("DUP@example.com", profile("Ben", "Cruz", "Purok 2")))
        .await
        .unwrap_err();

    assert!(matches!(err, BarangayError::EmailAlreadyInUse(_)));
    assert_eq!(accounts.account_count(), 1);
    assert_eq!(storage.list_residents(&ResidentFilter::default()).await.unwrap().len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_invalid_profile_creates_no_account() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();

    let err = storage
        .register_resident(&accounts, account("blank@example.com", profile("Ana", "Cruz", "  ")))
        .await
        .unwrap_err();

    assert!(matches!(err, BarangayError::Validation(_)));
    assert_eq!(accounts.account_count(), 0);
}

#[derive(Clone, Copy, PartialEq)]
enum Fault {
    ResidentInserts,
    UserReads,
}

/// Directory storage failing one kind of operation.
struct FaultyDirectory {
    inner: InMemoryStorage,
    fault: Fault,
}

impl FaultyDirectory {
    fn new(fault: Fault) -> Self {
        Self {
            inner: InMemoryStorage::new(),
            fault,
        }
    }

    fn fail(&self, fault: Fault) -> Result<()> {
        if self.fault == fault {
            return Err(BarangayError::Other(anyhow::anyhow!("table unavailable")));
        }
        Ok(())
    }
}

#[async_trait]
impl DirectoryStorage for FaultyDirectory {
    async fn insert_user(&self, user: &User) -> Result<()> {
        self.inner.insert_user(user).await
    }
    async fn get_user(&self, id: UserId) -> Result<User> {
        self.fail(Fault::UserReads)?;
        self.inner.get_user(id).await
    }
    async fn list_users(&self, role: Option<Role>) -> Result<Vec<User>> {
        self.inner.list_users(role).await
    }
    async fn persist_user(&self, user: &User) -> Result<()> {
        self.inner.persist_user(user).await
    }
    async fn delete_user(&self, id: UserId) -> Result<()> {
        self.inner.delete_user(id).await
    }
    async fn insert_resident(&self, resident: &Resident) -> Result<()> {
        self.fail(Fault::ResidentInserts)?;
        self.inner.insert_resident(resident).await
    }
    async fn get_resident(&self, id: ResidentId) -> Result<Resident> {
        self.inner.get_resident(id).await
    }
    async fn list_residents(&self, filter: &ResidentFilter) -> Result<Vec<Resident>> {
        self.inner.list_residents(filter).await
    }
    async fn persist_resident(&self, resident: &Resident) -> Result<()> {
        self.inner.persist_resident(resident).await
    }
    async fn delete_resident_record(&self, id: ResidentId) -> Result<()> {
        self.inner.delete_resident_record(id).await
    }
}

#[test_log::test(tokio::test)]
async fn test_failed_resident_insert_rolls_back_user_and_account() {
    let storage = FaultyDirectory::new(Fault::ResidentInserts);
    let accounts = InMemoryAccountProvider::new();

    let err = storage
        .register_resident(&accounts, account("roll@example.com", profile("Ana", "Cruz", "Purok 4")))
        .await
        .unwrap_err();

    assert!(matches!(err, BarangayError::Other(_)));
    assert_eq!(accounts.account_count(), 0);
    assert!(storage.list_users(None).await.unwrap().is_empty());

    // The email is free again
    assert!(accounts.create_account("roll@example.com", "mabuhay2024").await.is_ok());
}

#[test_log::test(tokio::test)]
async fn test_resident_rename_writes_nothing_when_user_unreadable() {
    let storage = FaultyDirectory::new(Fault::UserReads);
    let accounts = InMemoryAccountProvider::new();
    let (user, resident) = storage
        .register_resident(&accounts, account("sync@example.com", profile("Rico", "Yap", "Purok 2")))
        .await
        .unwrap();

    let err = storage
        .update_resident(
            resident.id,
            ResidentUpdate {
                last_name: Some("Yap-Lim".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BarangayError::Other(_)));

    let stored = storage.get_resident(resident.id).await.unwrap();
    assert_eq!(stored.last_name, "Yap");
    assert_eq!(storage.inner.get_user(user.id).await.unwrap().name, "Rico Yap");
}

#[test_log::test(tokio::test)]
async fn test_user_rename_writes_nothing_when_resident_missing() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let (user, resident) = storage
        .register_resident(&accounts, account("gone@example.com", profile("Elsa", "Ong", "Purok 3")))
        .await
        .unwrap();
    storage.delete_resident_record(resident.id).await.unwrap();

    let err = storage
        .update_user(
            user.id,
            UserUpdate {
                name: Some("Elsa Ong-Tan".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BarangayError::ResidentNotFound(_)));
    assert_eq!(storage.get_user(user.id).await.unwrap().name, "Elsa Ong");
}

#[test_log::test(tokio::test)]
async fn test_purok_change_recomputes_address() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let (user, resident) = storage
        .register_resident(&accounts, account("move@example.com", profile("Jun", "Torres", "Purok 1")))
        .await
        .unwrap();

    let updated = storage
        .update_resident(
            resident.id,
            ResidentUpdate {
                purok: Some("Purok 5".to_string()),
                contact_number: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.address, format!("Purok 5, {}", MUNICIPALITY_SUFFIX));
    assert!(updated.contact_number.is_none());
    // No name change, so the user keeps its name
    assert_eq!(storage.get_user(user.id).await.unwrap().name, "Jun Torres");
}

#[test_log::test(tokio::test)]
async fn test_resident_rename_updates_user_name() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let (user, resident) = storage
        .register_resident(&accounts, account("wed@example.com", profile("Liza", "Ramos", "Purok 3")))
        .await
        .unwrap();

    storage
        .update_resident(
            resident.id,
            ResidentUpdate {
                last_name: Some("Ramos-Garcia".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(storage.get_user(user.id).await.unwrap().name, "Liza Ramos-Garcia");
}

#[test_log::test(tokio::test)]
async fn test_user_rename_splits_into_resident_name() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let (user, resident) = storage
        .register_resident(&accounts, account("mcs@example.com", profile("Maria", "Santos", "Purok 2")))
        .await
        .unwrap();

    storage
        .update_user(
            user.id,
            UserUpdate {
                name: Some("Maria Clara Santos".to_string()),
                role: None,
            },
        )
        .await
        .unwrap();

    let synced = storage.get_resident(resident.id).await.unwrap();
    assert_eq!(synced.first_name, "Maria");
    assert_eq!(synced.last_name, "Clara Santos");
    assert_eq!(synced.middle_name.as_deref(), Some("Lopez"));

    // A single word only replaces the first name
    storage
        .update_user(
            user.id,
            UserUpdate {
                name: Some("Clarita".to_string()),
                role: None,
            },
        )
        .await
        .unwrap();
    let synced = storage.get_resident(resident.id).await.unwrap();
    assert_eq!(synced.first_name, "Clarita");
    assert_eq!(synced.last_name, "Clara Santos");
}

#[test_log::test(tokio::test)]
async fn test_role_changes_stay_within_staff() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let admin = admin(&storage).await;
    let (resident_user, _) = storage
        .register_resident(&accounts, account("res@example.com", profile("Noel", "Diaz", "Purok 6")))
        .await
        .unwrap();

    let secretary = storage
        .create_staff_user(
            &admin,
            &accounts,
            NewStaffAccount {
                email: "sec@office.example.com".to_string(),
                password: "ledger2024".to_string(),
                name: "Rita Secretary".to_string(),
                role: Role::Secretary,
            },
        )
        .await
        .unwrap();

    let promoted = storage
        .update_user(
            secretary.id,
            UserUpdate {
                name: None,
                role: Some(Role::Treasurer),
            },
        )
        .await
        .unwrap();
    assert_eq!(promoted.role, Role::Treasurer);

    for (id, role) in [(secretary.id, Role::Resident), (resident_user.id, Role::Secretary)] {
        let err = storage
            .update_user(id, UserUpdate { name: None, role: Some(role) })
            .await
            .unwrap_err();
        assert!(matches!(err, BarangayError::Validation(_)));
    }

    let treasurers = storage.list_users(Some(Role::Treasurer)).await.unwrap();
    assert_eq!(treasurers.len(), 1);
}

#[test_log::test(tokio::test)]
async fn test_only_admins_create_staff() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let admin = admin(&storage).await;
    let captain = storage
        .create_staff_user(
            &admin,
            &accounts,
            NewStaffAccount {
                email: "kap@office.example.com".to_string(),
                password: "kapitan2024".to_string(),
                name: "Kapitan Cruz".to_string(),
                role: Role::BarangayCaptain,
            },
        )
        .await
        .unwrap();

    let err = storage
        .create_staff_user(
            &captain,
            &accounts,
            NewStaffAccount {
                email: "other@office.example.com".to_string(),
                password: "kapitan2024".to_string(),
                name: "Someone".to_string(),
                role: Role::Secretary,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BarangayError::Forbidden(_)));

    let err = storage
        .create_staff_user(
            &admin,
            &accounts,
            NewStaffAccount {
                email: "resident@example.com".to_string(),
                password: "kapitan2024".to_string(),
                name: "Not Staff".to_string(),
                role: Role::Resident,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BarangayError::Validation(_)));
    assert_eq!(accounts.account_count(), 1);
}

#[test_log::test(tokio::test)]
async fn test_sign_in_checks_password() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let (user, _) = storage
        .register_resident(&accounts, account("login@example.com", profile("Ria", "Go", "Purok 1")))
        .await
        .unwrap();

    let signed_in = storage
        .sign_in(&accounts, "LOGIN@example.com", "mabuhay2024")
        .await
        .unwrap();
    assert_eq!(signed_in.id, user.id);
    assert!(signed_in.role.can_see(NavSection::MyRequests));
    assert!(!signed_in.role.can_see(NavSection::Residents));

    let err = storage
        .sign_in(&accounts, "login@example.com", "wrong-password")
        .await
        .unwrap_err();
    assert!(matches!(err, BarangayError::InvalidCredentials));
}

#[test_log::test(tokio::test)]
async fn test_avatar_upload_records_url() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let objects = InMemoryObjectStore::new();
    let (_, resident) = storage
        .register_resident(&accounts, account("pic@example.com", profile("Cora", "Lim", "Purok 2")))
        .await
        .unwrap();

    let updated = storage
        .upload_avatar(&objects, resident.id, "me.png", vec![0x89, 0x50, 0x4e, 0x47])
        .await
        .unwrap();

    let path = format!("profile-pictures/{}/me.png", *resident.id);
    assert_eq!(updated.avatar_url, Some(format!("memory://{}", path)));
    let stored = objects.get(&path).await.unwrap().unwrap();
    assert_eq!(stored.content_type, "image/png");
    assert_eq!(stored.bytes.len(), 4);

    let err = storage
        .upload_avatar(&objects, resident.id, "../escape.png", vec![1])
        .await
        .unwrap_err();
    assert!(matches!(err, BarangayError::Validation(_)));
}

#[test_log::test(tokio::test)]
async fn test_deleting_resident_keeps_request_history() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    let admin = admin(&storage).await;
    let (user, resident) = storage
        .register_resident(&accounts, account("gone@example.com", profile("Tomas", "Uy", "Purok 7")))
        .await
        .unwrap();
    let request = storage
        .submit_request(
            &user,
            resident.id,
            DocumentRequestInput {
                document_type: DocumentType::CertificateOfIndigency,
                purpose: None,
            },
            &FeeSchedule::default(),
        )
        .await
        .unwrap();

    storage.delete_resident(&accounts, resident.id).await.unwrap();

    assert!(matches!(
        storage.get_resident(resident.id).await,
        Err(BarangayError::ResidentNotFound(_))
    ));
    assert!(matches!(
        storage.get_user(user.id).await,
        Err(BarangayError::UserNotFound(_))
    ));
    assert_eq!(accounts.account_count(), 0);

    let kept = storage.get_request_for(&admin, request.data.id).await.unwrap();
    assert_eq!(kept.data().resident_name, "Tomas Uy");
}

#[test_log::test(tokio::test)]
async fn test_resident_search_and_purok_filter() {
    let storage = InMemoryStorage::new();
    let accounts = InMemoryAccountProvider::new();
    for (email, first, last, purok) in [
        ("a@example.com", "Alma", "Reyes", "Purok 1"),
        ("b@example.com", "Berto", "Reyes", "Purok 2"),
        ("c@example.com", "Celia", "Abad", "Purok 1"),
    ] {
        storage
            .register_resident(&accounts, account(email, profile(first, last, purok)))
            .await
            .unwrap();
    }

    let reyes = storage
        .list_residents(&ResidentFilter {
            search: Some("REYES".to_string()),
            purok: None,
        })
        .await
        .unwrap();
    assert_eq!(reyes.len(), 2);

    let purok_one = storage
        .list_residents(&ResidentFilter {
            search: None,
            purok: Some("purok 1".to_string()),
        })
        .await
        .unwrap();
    let names: Vec<_> = purok_one.iter().map(|r| r.full_name()).collect();
    assert_eq!(names, vec!["Celia Abad", "Alma Reyes"]);
}
