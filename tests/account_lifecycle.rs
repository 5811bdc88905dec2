mod common;
use common::TestServices;
use slircd_services::acl::{AclFlags, AclTarget};
use slircd_services::config::Config;
use slircd_services::error::AccountError;
use slircd_services::services::ServiceEffect;
use slircd_services::state::{
    AccountFlags, GroupAccessFlags, MD_MARK_REASON, MD_MARK_SETTER, MD_MARK_TIMESTAMP,
};

#[test]
fn duplicate_registration_leaves_original_untouched() {
    let mut t = TestServices::new();
    let alice = t.account("alice");

    let err = t
        .matrix
        .account_add("ALICE", "other", "x@example.com", AccountFlags::empty())
        .unwrap_err();
    assert_eq!(err, AccountError::Exists("ALICE".into()));
    assert_eq!(err.error_code(), "account_exists");

    let account = t.matrix.account(&alice).expect("still there");
    assert_eq!(account.email(), "alice@example.com");
    assert!(t.matrix.verify_password(&alice, "secret"));
    assert_eq!(t.matrix.entity_name(&alice), Some("alice"));
}

#[test]
fn registration_refused_when_nick_belongs_to_someone_else() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    t.matrix.nick_add(&alice, "wonder")?;

    let err = t
        .matrix
        .account_add("wonder", "pw", "w@example.com", AccountFlags::empty())
        .unwrap_err();
    assert_eq!(err, AccountError::NickInUse("wonder".into()));
    assert!(t.matrix.account_find("wonder").is_none());
    Ok(())
}

#[test]
fn lookup_by_nick_and_entity_id() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    t.matrix.nick_add(&alice, "wonder")?;

    assert_eq!(t.matrix.account_find_ext("Alice"), Some(alice.clone()));
    assert_eq!(t.matrix.account_find_ext("wonder"), Some(alice.clone()));
    assert_eq!(
        t.matrix.account_find_ext(&format!("?{alice}")),
        Some(alice.clone())
    );
    assert_eq!(t.matrix.account_find_ext("nobody"), None);
    Ok(())
}

#[test]
fn nick_lookup_disabled_without_nick_ownership() {
    let mut config = Config::default();
    config.accounts.nick_ownership = false;
    let mut t = TestServices::with_config(config);
    t.account("alice");

    assert!(t.matrix.nick_find("alice").is_none());
    assert!(t.matrix.account_find_ext("alice").is_some());
}

#[test]
fn rename_moves_name_and_cycles_sessions() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    t.account("bob");
    let uid = t.connect_as("alice", &alice);
    t.matrix.take_effects();

    assert_eq!(
        t.matrix.account_rename(&alice, "bob").unwrap_err(),
        AccountError::NameInUse("bob".into())
    );

    t.matrix.account_rename(&alice, "alicia")?;
    assert_eq!(t.matrix.entity_name(&alice), Some("alicia"));
    assert_eq!(t.matrix.account_id("alicia"), Some(alice.clone()));
    assert!(t.matrix.account_find("alice").is_none());

    let effects = t.matrix.take_effects();
    assert_eq!(
        effects,
        vec![
            ServiceEffect::Logout {
                uid: uid.clone(),
                account: "alice".into(),
            },
            ServiceEffect::Login {
                uid,
                account: "alicia".into(),
            },
        ]
    );
    Ok(())
}

#[test]
fn delete_cascades_through_satellite_records() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    let bob = t.account("bob");
    t.matrix.nick_add(&alice, "wonder")?;
    t.matrix.certfp_add(&alice, "AABBCC", false)?;
    let staff = t.matrix.group_add("!staff")?;
    t.matrix
        .group_access_add(&staff, &alice, GroupAccessFlags::DEFAULT)?;
    t.matrix.channel_register("#bob", &bob)?;
    t.matrix
        .acl_add("#bob", AclTarget::Entity(alice.clone()), AclFlags::VOP_DEF, None);
    let uid = t.connect_as("alice", &alice);
    t.matrix.take_effects();

    assert!(t.matrix.account_delete(&alice));

    assert!(t.matrix.account(&alice).is_none());
    assert!(t.matrix.nick_find("alice").is_none());
    assert!(t.matrix.nick_find("wonder").is_none());
    assert!(t.matrix.certfp_find("aabbcc").is_none());
    assert!(t.matrix.group(&staff).is_some_and(|g| g.members().is_empty()));
    assert_eq!(t.matrix.acl_entries("#bob").count(), 1);
    assert_eq!(t.matrix.user(&uid).and_then(|u| u.account.clone()), None);
    assert!(t.matrix.take_effects().contains(&ServiceEffect::Logout {
        uid,
        account: "alice".into(),
    }));

    // the name is free again
    t.account("alice");
    Ok(())
}

#[test]
fn mark_survives_reregistration() {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    t.matrix.account_metadata_set(&alice, MD_MARK_SETTER, "oper");
    t.matrix
        .account_metadata_set(&alice, MD_MARK_REASON, "ban evasion");
    t.matrix
        .account_metadata_set(&alice, MD_MARK_TIMESTAMP, "1700000000");
    t.matrix.account_delete(&alice);
    assert!(t.matrix.old_name_find("alice").is_some());

    let again = t.account("alice");
    assert_eq!(t.matrix.account_metadata(&again, MD_MARK_SETTER), Some("oper"));
    assert_eq!(
        t.matrix.account_metadata(&again, MD_MARK_REASON),
        Some("(restored) ban evasion")
    );
    assert!(t.matrix.old_name_find("alice").is_none());
}

#[test]
fn login_limit_is_enforced() -> anyhow::Result<()> {
    let mut config = Config::default();
    config.accounts.max_logins = 2;
    let mut t = TestServices::with_config(config);
    let alice = t.account("alice");
    t.connect_as("alice", &alice);
    t.connect_as("alice_", &alice);

    let third = t.connect("alice__");
    let err = t.matrix.login(&third, &alice).unwrap_err();
    assert_eq!(err, AccountError::LoginLimit("alice".into()));

    t.matrix
        .account_mut(&alice)
        .expect("account")
        .flags
        .insert(AccountFlags::LOGINNOLIMIT);
    t.matrix.login(&third, &alice)?;
    assert_eq!(t.matrix.account(&alice).map(|a| a.logins().len()), Some(3));
    Ok(())
}

#[test]
fn canonical_email_groups_aliases() -> anyhow::Result<()> {
    let t = TestServices::from_toml(
        r#"
        [accounts]
        canonical_domains = ["gmail.com"]
        "#,
    )?;
    assert_eq!(
        t.matrix.canonicalize_email("Jane.Doe+irc@GMail.com"),
        "janedoe@gmail.com"
    );
    assert_eq!(
        t.matrix.canonicalize_email("jane.doe+irc@example.com"),
        "jane.doe+irc@example.com"
    );
    Ok(())
}

#[test]
fn auth_cookies_expire_after_an_hour() {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    let ticket = t.matrix.authcookie_create(&alice).expect("ticket");
    assert!(t.matrix.authcookie_validate(&alice, &ticket));

    t.matrix.advance_time(slircd_services::state::AUTHCOOKIE_TTL);
    assert!(!t.matrix.authcookie_validate(&alice, &ticket));
}
