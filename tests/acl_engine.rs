mod common;
use common::TestServices;
use slircd_services::acl::{AclFlags, AclTarget};
use slircd_services::error::AclError;
use slircd_services::state::{ChannelFlags, GroupAccessFlags};

#[test]
fn escalation_outside_restrict_is_denied() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    let bob = t.account("bob");
    t.matrix.channel_register("#foo", &alice)?;

    let id = t
        .matrix
        .acl_add("#foo", AclTarget::Entity(bob.clone()), AclFlags::OP, None)
        .expect("entry");

    let err = t
        .matrix
        .acl_modify(
            id,
            AclFlags::FOUNDER,
            AclFlags::empty(),
            AclFlags::OP | AclFlags::VOICE,
            Some(alice.clone()),
        )
        .unwrap_err();
    assert!(matches!(err, AclError::Denied { .. }));
    assert_eq!(err.error_code(), "acl_denied");
    assert_eq!(t.matrix.acl_entry(id).map(|e| e.level), Some(AclFlags::OP));
    Ok(())
}

#[test]
fn change_creates_then_removes_entry() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    let bob = t.account("bob");
    t.matrix.channel_register("#foo", &alice)?;
    let target = AclTarget::Entity(bob.clone());

    let delta = t.matrix.acl_change_simple(
        "#foo",
        &target,
        AclFlags::VOICE | AclFlags::TOPIC,
        AclFlags::empty(),
        Some(alice.clone()),
    )?;
    assert_eq!(delta.added, AclFlags::VOICE | AclFlags::TOPIC);
    assert!(t.matrix.entity_has_flag("#foo", &bob, AclFlags::VOICE));

    let delta = t.matrix.acl_change_simple(
        "#foo",
        &target,
        AclFlags::empty(),
        AclFlags::VOICE | AclFlags::TOPIC,
        Some(alice.clone()),
    )?;
    assert_eq!(delta.removed, AclFlags::VOICE | AclFlags::TOPIC);
    assert!(t.matrix.acl_find_literal("#foo", &bob, AclFlags::empty()).is_none());
    Ok(())
}

#[test]
fn change_on_unregistered_channel_fails() {
    let mut t = TestServices::new();
    let bob = t.account("bob");
    let err = t
        .matrix
        .acl_change_simple(
            "#nowhere",
            &AclTarget::Entity(bob),
            AclFlags::VOICE,
            AclFlags::empty(),
            None,
        )
        .unwrap_err();
    assert_eq!(err, AclError::NoSuchChannel("#nowhere".into()));
}

#[test]
fn invariant_violations_return_none() {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    assert!(
        t.matrix
            .acl_add("foo", AclTarget::Entity(alice.clone()), AclFlags::OP, None)
            .is_none()
    );
    assert!(
        t.matrix
            .acl_add("#unregistered", AclTarget::Entity(alice), AclFlags::OP, None)
            .is_none()
    );
}

#[test]
fn user_flags_combine_account_host_and_group() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    let bob = t.account("bob");
    let staff = t.matrix.group_add("!staff")?;
    t.matrix
        .group_access_add(&staff, &bob, GroupAccessFlags::DEFAULT)?;
    t.matrix.channel_register("#foo", &alice)?;

    t.matrix
        .acl_add("#foo", AclTarget::Entity(staff), AclFlags::OP, None);
    t.matrix.acl_add(
        "#foo",
        AclTarget::Host("*!*@bob.example.net".into()),
        AclFlags::TOPIC,
        None,
    );

    let uid = t.connect_as("bob", &bob);
    let flags = t.matrix.user_flags("#foo", &uid);
    assert!(flags.contains(AclFlags::OP | AclFlags::TOPIC));
    assert!(t.matrix.user_has_flag("#foo", &uid, AclFlags::OP));

    // group members without the chanacs privilege inherit nothing
    let carol = t.account("carol");
    let staff = t.matrix.group_find("!staff").map(|e| e.id.clone()).expect("group");
    t.matrix
        .group_access_add(&staff, &carol, GroupAccessFlags::ACLVIEW)?;
    assert!(!t.matrix.entity_has_flag("#foo", &carol, AclFlags::OP));
    Ok(())
}

#[test]
fn unverified_accounts_only_see_bans() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    let bob = t
        .matrix
        .account_add("bob", "pw", "b@example.com", slircd_services::state::AccountFlags::WAITAUTH)?;
    t.matrix.channel_register("#foo", &alice)?;
    t.matrix.acl_add(
        "#foo",
        AclTarget::Entity(bob.clone()),
        AclFlags::OP | AclFlags::AKICK,
        None,
    );

    let uid = t.connect_as("bob", &bob);
    assert_eq!(t.matrix.user_flags("#foo", &uid), AclFlags::AKICK);
    Ok(())
}

#[test]
fn table_full_blocks_new_entries() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    t.matrix.config.channels.max_acl_entries = 2;
    let alice = t.account("alice");
    let bob = t.account("bob");
    let carol = t.account("carol");
    t.matrix.channel_register("#foo", &alice)?;
    t.matrix
        .acl_open("#foo", &AclTarget::Entity(bob), true, None)?;

    let err = t
        .matrix
        .acl_open("#foo", &AclTarget::Entity(carol), true, None)
        .unwrap_err();
    assert_eq!(err.error_code(), "acl_table_full");
    Ok(())
}

#[test]
fn open_then_close_leaves_nothing() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    t.matrix.channel_register("#foo", &alice)?;
    let host = AclTarget::Host("*!*@*.example.org".into());

    let id = t.matrix.acl_open("#foo", &host, true, None)?;
    assert_eq!(t.matrix.acl_entry(id).map(|e| e.level), Some(AclFlags::empty()));
    assert!(t.matrix.acl_close(id));
    assert!(t.matrix.acl_find_host_literal("#foo", "*!*@*.example.org", AclFlags::empty()).is_none());
    Ok(())
}

#[test]
fn limitflags_narrows_grantable_flags() -> anyhow::Result<()> {
    let mut t = TestServices::new();
    let alice = t.account("alice");
    t.matrix.channel_register("#foo", &alice)?;

    let op_only = AclFlags::OP | AclFlags::FLAGS | AclFlags::VOICE;
    assert!(t.matrix.allow_flags("#foo", op_only).contains(AclFlags::OP));

    t.matrix
        .channel_mut("#foo")
        .expect("registered")
        .flags
        .insert(ChannelFlags::LIMITFLAGS);
    assert_eq!(t.matrix.allow_flags("#foo", op_only), AclFlags::empty());
    Ok(())
}
