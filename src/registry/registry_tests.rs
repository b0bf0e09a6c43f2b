use super::*;
use crate::credential::BcryptOnly;

fn rules(allow: &[&str], deny: &[&str]) -> SubjectRules {
    SubjectRules {
        allow: allow.iter().map(|s| s.to_string()).collect(),
        deny: deny.iter().map(|s| s.to_string()).collect(),
    }
}

#[test]
fn upsert_identity_creates_and_replaces() {
    let reg = Registry::in_memory();
    reg.upsert_identity("user-a", "secret", Some("normal-user".into()), None).unwrap();
    reg.upsert_identity("user-a", "other", None, Some("foo".into())).unwrap();
    let got = reg.get_identity("user-a").unwrap();
    assert_eq!(got.credential, "other");
    assert_eq!(got.permission_ref, None);
    assert_eq!(got.account_ref.as_deref(), Some("foo"));
    assert_eq!(reg.list_identities().len(), 1);
}

#[test]
fn upsert_is_idempotent() {
    let reg = Registry::in_memory();
    let a = reg.upsert_identity("user-a", "secret", Some("p".into()), None).unwrap();
    let b = reg.upsert_identity("user-a", "secret", Some("p".into()), None).unwrap();
    assert_eq!(a, b);
    assert_eq!(reg.get_all().identities.len(), 1);
}

#[test]
fn dangling_permission_ref_is_accepted_at_upsert() {
    let reg = Registry::in_memory();
    assert!(reg.upsert_identity("user-a", "secret", Some("missing".into()), None).is_ok());
}

#[test]
fn invalid_input_never_reaches_state() {
    let reg = Registry::in_memory();
    assert!(matches!(reg.upsert_identity("", "secret", None, None), Err(ConfError::Validation { .. })));
    assert!(matches!(reg.upsert_identity("a", "", None, None), Err(ConfError::Validation { .. })));
    assert!(matches!(
        reg.upsert_permission("p", rules(&["foo..bar"], &[]), SubjectRules::default()),
        Err(ConfError::Validation { .. })
    ));
    assert_eq!(reg.get_all(), RegistryView::default());
}

#[test]
fn credential_policy_is_applied() {
    let reg = Registry::in_memory_with_policy(Box::new(BcryptOnly));
    let err = reg.upsert_identity("a", "secret", None, None).unwrap_err();
    assert_eq!(err.code_str(), "validation_error");
    let hash = "$2a$11$pBwUBpza8vdJ7tWZcP5GRO13qRgh4dwNn8g67k5i/41yIKBp.sHke";
    assert!(reg.upsert_identity("a", hash, None, None).is_ok());
}

#[test]
fn delete_missing_is_not_found() {
    let reg = Registry::in_memory();
    assert!(matches!(reg.delete_identity("nobody"), Err(ConfError::NotFound { .. })));
    assert!(matches!(reg.delete_permission("nothing"), Err(ConfError::NotFound { .. })));
    reg.upsert_permission("p", rules(&["foo"], &[]), SubjectRules::default()).unwrap();
    reg.delete_permission("p").unwrap();
    assert!(reg.get_permission("p").is_err());
}

#[test]
fn permission_lists_are_deduplicated() {
    let reg = Registry::in_memory();
    let t = reg
        .upsert_permission("p", rules(&["foo", "bar", "foo"], &[]), rules(&[], &["quux", "quux"]))
        .unwrap();
    assert_eq!(t.publish.allow, vec!["foo".to_string(), "bar".to_string()]);
    assert_eq!(t.subscribe.deny, vec!["quux".to_string()]);
}

#[test]
fn view_is_detached_from_later_mutations() {
    let reg = Registry::in_memory();
    reg.upsert_identity("a", "one", None, None).unwrap();
    let view = reg.get_all();
    reg.upsert_identity("a", "two", None, None).unwrap();
    reg.upsert_identity("b", "three", None, None).unwrap();
    assert_eq!(view.identities.len(), 1);
    assert_eq!(view.identities["a"].credential, "one");
}

#[test]
fn mirror_survives_reopen() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let reg = Registry::open(tmp.path(), Box::new(Plaintext)).unwrap();
        reg.upsert_identity("user-a", "secret", Some("normal-user".into()), Some("foo".into())).unwrap();
        reg.upsert_identity("user-b", "secret", None, None).unwrap();
        reg.upsert_permission("normal-user", rules(&["foo", "bar"], &[]), rules(&[], &["quux"])).unwrap();
        reg.delete_identity("user-b").unwrap();
    }
    let reg = Registry::open(tmp.path(), Box::new(Plaintext)).unwrap();
    let view = reg.get_all();
    assert_eq!(view.identities.keys().collect::<Vec<_>>(), vec!["user-a"]);
    assert_eq!(view.identities["user-a"].account_ref.as_deref(), Some("foo"));
    assert_eq!(view.permissions["normal-user"].subscribe.deny, vec!["quux".to_string()]);
}

#[test]
fn mirror_rejects_mismatched_file_name() {
    let tmp = tempfile::tempdir().unwrap();
    {
        let reg = Registry::open(tmp.path(), Box::new(Plaintext)).unwrap();
        reg.upsert_identity("user-a", "secret", None, None).unwrap();
    }
    let users = crate::paths::users_dir(tmp.path());
    std::fs::rename(users.join("user-a.json"), users.join("user-z.json")).unwrap();
    let err = Registry::open(tmp.path(), Box::new(Plaintext)).err().expect("mismatch must fail");
    assert_eq!(err.code_str(), "storage_failure");
}

#[test]
fn concurrent_upserts_have_a_last_writer() {
    use std::sync::Arc;
    let reg = Arc::new(Registry::in_memory());
    let handles: Vec<_> = (0..8)
        .map(|t| {
            let reg = reg.clone();
            std::thread::spawn(move || {
                for i in 0..200 {
                    let cred = format!("t{}-{}", t, i);
                    reg.upsert_identity("shared", &cred, Some(format!("p{}", t)), None).unwrap();
                }
            })
        })
        .collect();
    for h in handles { h.join().unwrap(); }
    let got = reg.get_identity("shared").unwrap();
    // credential and permission_ref come from the same upsert
    let t = got.credential.trim_start_matches('t').split('-').next().unwrap().to_string();
    assert_eq!(got.permission_ref, Some(format!("p{}", t)));
}

#[cfg(unix)]
#[test]
fn failed_mirror_write_leaves_memory_untouched() {
    let tmp = tempfile::tempdir().unwrap();
    let reg = Registry::open(tmp.path(), Box::new(Plaintext)).unwrap();
    reg.upsert_identity("user-a", "old", None, None).unwrap();
    reg.upsert_permission("p", rules(&["a"], &[]), SubjectRules::default()).unwrap();

    // Directories where the resource files go make the rename fail.
    let users = crate::paths::users_dir(tmp.path());
    let perms = crate::paths::permissions_dir(tmp.path());
    std::fs::remove_file(users.join("user-a.json")).unwrap();
    std::fs::create_dir(users.join("user-a.json")).unwrap();
    std::fs::create_dir(users.join("user-b.json")).unwrap();
    std::fs::remove_file(perms.join("p.json")).unwrap();
    std::fs::create_dir(perms.join("p.json")).unwrap();

    let err = reg.upsert_identity("user-a", "new", Some("p".into()), None).unwrap_err();
    assert_eq!(err.code_str(), "storage_failure");
    let got = reg.get_identity("user-a").unwrap();
    assert_eq!(got.credential, "old");
    assert_eq!(got.permission_ref, None);

    let err = reg.upsert_identity("user-b", "pw", None, None).unwrap_err();
    assert_eq!(err.code_str(), "storage_failure");
    assert!(matches!(reg.get_identity("user-b"), Err(ConfError::NotFound { .. })));

    let err = reg.upsert_permission("p", rules(&["b"], &[]), SubjectRules::default()).unwrap_err();
    assert_eq!(err.code_str(), "storage_failure");
    assert_eq!(reg.get_permission("p").unwrap().publish.allow, vec!["a".to_string()]);

    for dir in [&users, &perms] {
        let staged = std::fs::read_dir(dir)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .count();
        assert_eq!(staged, 0, "staging files left in {}", dir.display());
    }
}
