//! Record codecs: how each kind of state maps onto snapshot rows.
//!
//! | Row    | Fields                                                        |
//! |--------|---------------------------------------------------------------|
//! | `DBV`  | version                                                       |
//! | `LUID` | last allocated entity id                                      |
//! | `CF`   | access flag letters supported when written                    |
//! | `OC`   | class, flags, privileges...                                   |
//! | `MU`   | id, name, password, email, registered, last login, flags, lang |
//! | `MDU`  | account, key, value...                                        |
//! | `ME`   | account, sender, sent, status, text...                        |
//! | `MI`   | account, ignored sender                                       |
//! | `AC`   | account, access mask                                          |
//! | `MN`   | account, nick, registered, last seen                          |
//! | `MCFP` | account, fingerprint                                          |
//! | `GRP`  | id, name, registered, flags                                   |
//! | `MDG`  | group, key, value...                                          |
//! | `GACS` | group, member id, flags                                       |
//! | `MC`   | channel, registered, used, flags, mlock on/off/limit/key      |
//! | `MDC`  | channel, key, value...                                        |
//! | `CA`   | channel, target, flag letters, modified, setter id            |
//! | `MDA`  | channel, target, key, value...                                |
//! | `NAM`  | remembered name                                               |
//! | `MDN`  | remembered name, key, value...                                |
//! | `SO`   | account, class, flags, [password]                             |

use super::{FlatRow, RowReader, RowWriter};
use crate::acl::{AclFlags, AclId, AclTarget, to_letters};
use crate::error::DbError;
use crate::privs::{OperClassFlags, SoperFlags, SoperTarget};
use crate::state::{
    Account, AccountFlags, ChannelFlags, Entity, EntityData, EntityId, EntityKind, Group,
    GroupAccessFlags, GroupFlags, GroupMember, Matrix, Memo, Metadata, Nick, OldName,
};
use tracing::{debug, warn};

/// Snapshot format version written by this build.
pub const DB_VERSION: u32 = 1;

/// Channel metadata key carrying the opaque part of the mode lock.
const MD_MLOCK_EXT: &str = "private:mlockext";

/// Placeholder for an absent optional word.
const NONE_WORD: &str = "*";

fn opt_word(word: Option<&str>) -> &str {
    word.filter(|w| !w.is_empty()).unwrap_or(NONE_WORD)
}

fn from_opt_word(word: &str) -> Option<String> {
    (word != NONE_WORD).then(|| word.to_string())
}

fn read_bits(row: &mut impl RowReader) -> Result<u32, DbError> {
    let line = row.line();
    let n = row.read_uint()?;
    u32::try_from(n).map_err(|_| DbError::parse(line, format!("flag word {n} out of range")))
}

/// Write one row. A row carrying a field the backend cannot store is
/// dropped with a warning; the rest of the snapshot is still written.
fn put_row<W, F>(w: &mut W, kind: &str, fields: F) -> Result<(), DbError>
where
    W: RowWriter,
    F: FnOnce(&mut W) -> Result<(), DbError>,
{
    w.start_row(kind)?;
    match fields(w) {
        Ok(()) => w.commit_row(),
        Err(DbError::Unencodable(field)) => {
            w.discard_row();
            warn!(row = kind, field = ?field, "Skipping row that cannot be stored");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn write_metadata<W: RowWriter>(
    w: &mut W,
    kind: &str,
    owner: &[&str],
    metadata: &Metadata,
) -> Result<(), DbError> {
    for (key, value) in metadata {
        put_row(w, kind, |w| {
            for word in owner {
                w.write_word(word)?;
            }
            w.write_word(key)?;
            w.write_str(value)
        })?;
    }
    Ok(())
}

impl Matrix {
    // ------------------------------------------------------------------------
    // Writing
    // ------------------------------------------------------------------------

    pub(crate) fn write_rows<W: RowWriter>(&self, w: &mut W) -> Result<(), DbError> {
        self.write_header(w)?;
        self.write_operclasses(w)?;
        for entity in self.entities_of(EntityKind::Account) {
            self.write_account(w, entity)?;
        }
        self.write_groups(w)?;
        for channel in self.channels.keys() {
            self.write_channel(w, channel)?;
        }
        self.write_old_names(w)?;
        self.write_sopers(w)
    }

    fn write_header<W: RowWriter>(&self, w: &mut W) -> Result<(), DbError> {
        put_row(w, "DBV", |w| w.write_uint(u64::from(DB_VERSION)))?;
        if let Some(last) = self.last_entity_id() {
            put_row(w, "LUID", |w| w.write_word(last.as_str()))?;
        }
        put_row(w, "CF", |w| w.write_word(&to_letters(self.policy.all())))
    }

    fn write_operclasses<W: RowWriter>(&self, w: &mut W) -> Result<(), DbError> {
        for class in self.privs.classes() {
            if class.flags.contains(OperClassFlags::BUILTIN) || self.config_declares_class(&class.name) {
                continue;
            }
            put_row(w, "OC", |w| {
                w.write_word(&class.name)?;
                w.write_uint(u64::from(class.flags.bits()))?;
                w.write_str(&class.privs)
            })?;
        }
        Ok(())
    }

    fn config_declares_class(&self, name: &str) -> bool {
        self.config
            .operclass
            .iter()
            .any(|c| c.name.eq_ignore_ascii_case(name))
    }

    fn write_account<W: RowWriter>(&self, w: &mut W, entity: &Entity) -> Result<(), DbError> {
        let Some(account) = entity.as_account() else {
            return Ok(());
        };
        let name = entity.name.as_str();

        put_row(w, "MU", |w| {
            w.write_word(entity.id.as_str())?;
            w.write_word(name)?;
            w.write_word(opt_word(Some(&account.pass)))?;
            w.write_word(opt_word(Some(&account.email)))?;
            w.write_time(account.registered)?;
            w.write_time(account.last_login)?;
            w.write_uint(u64::from(account.flags.bits()))?;
            w.write_word(opt_word(account.language.as_deref()))
        })?;

        write_metadata(w, "MDU", &[name], &account.metadata)?;

        for memo in &account.memos {
            put_row(w, "ME", |w| {
                w.write_word(name)?;
                w.write_word(&memo.sender)?;
                w.write_time(memo.sent)?;
                w.write_uint(u64::from(memo.status))?;
                w.write_str(&memo.text)
            })?;
        }
        for ignored in &account.memo_ignores {
            put_row(w, "MI", |w| {
                w.write_word(name)?;
                w.write_word(ignored)
            })?;
        }
        for mask in &account.access_masks {
            put_row(w, "AC", |w| {
                w.write_word(name)?;
                w.write_word(mask)
            })?;
        }
        for nick in account.nicks.iter().filter_map(|n| self.nicks.get(n)) {
            put_row(w, "MN", |w| {
                w.write_word(name)?;
                w.write_word(&nick.nick)?;
                w.write_time(nick.registered)?;
                w.write_time(nick.last_seen)
            })?;
        }
        for fp in &account.certfps {
            put_row(w, "MCFP", |w| {
                w.write_word(name)?;
                w.write_word(fp)
            })?;
        }
        Ok(())
    }

    /// All groups first, then memberships, since members may be groups.
    fn write_groups<W: RowWriter>(&self, w: &mut W) -> Result<(), DbError> {
        for entity in self.entities_of(EntityKind::Group) {
            let Some(group) = entity.as_group() else {
                continue;
            };
            put_row(w, "GRP", |w| {
                w.write_word(entity.id.as_str())?;
                w.write_word(&entity.name)?;
                w.write_time(group.registered)?;
                w.write_uint(u64::from(group.flags.bits()))
            })?;
            write_metadata(w, "MDG", &[&entity.name], &group.metadata)?;
        }

        for entity in self.entities_of(EntityKind::Group) {
            for member in entity.as_group().map(Group::members).unwrap_or_default() {
                put_row(w, "GACS", |w| {
                    w.write_word(&entity.name)?;
                    w.write_word(member.member.as_str())?;
                    w.write_uint(u64::from(member.flags.bits()))
                })?;
            }
        }
        Ok(())
    }

    fn write_channel<W: RowWriter>(&self, w: &mut W, key: &str) -> Result<(), DbError> {
        let Some(reg) = self.channels.get(key) else {
            return Ok(());
        };
        let name = reg.name.as_str();

        put_row(w, "MC", |w| {
            w.write_word(name)?;
            w.write_time(reg.registered)?;
            w.write_time(reg.used)?;
            w.write_uint(u64::from(reg.flags.bits()))?;
            w.write_uint(u64::from(reg.mlock.on))?;
            w.write_uint(u64::from(reg.mlock.off))?;
            w.write_uint(u64::from(reg.mlock.limit))?;
            w.write_word(opt_word(reg.mlock.key.as_deref()))
        })?;

        write_metadata(w, "MDC", &[name], &reg.metadata)?;
        if !reg.mlock.ext.is_empty() {
            put_row(w, "MDC", |w| {
                w.write_word(name)?;
                w.write_word(MD_MLOCK_EXT)?;
                w.write_str(&reg.mlock.ext)
            })?;
        }

        for entry in self.acl_entries(name) {
            let target = match &entry.target {
                AclTarget::Entity(id) => match self.entity_name(id) {
                    Some(n) => n,
                    None => continue,
                },
                AclTarget::Host(mask) => mask.as_str(),
            };
            put_row(w, "CA", |w| {
                w.write_word(name)?;
                w.write_word(target)?;
                w.write_word(&to_letters(entry.level))?;
                w.write_time(entry.modified)?;
                w.write_word(opt_word(entry.setter.as_ref().map(EntityId::as_str)))
            })?;
            write_metadata(w, "MDA", &[name, target], &entry.metadata)?;
        }
        Ok(())
    }

    fn write_old_names<W: RowWriter>(&self, w: &mut W) -> Result<(), DbError> {
        for old in self.old_names.values() {
            put_row(w, "NAM", |w| w.write_word(&old.name))?;
            write_metadata(w, "MDN", &[&old.name], &old.metadata)?;
        }
        Ok(())
    }

    /// Services operators from configuration are not stored.
    fn write_sopers<W: RowWriter>(&self, w: &mut W) -> Result<(), DbError> {
        for soper in self.privs.sopers() {
            if soper.flags.contains(SoperFlags::CONF) {
                continue;
            }
            let SoperTarget::Account(id) = &soper.target else {
                continue;
            };
            let Some(name) = self.entity_name(id) else {
                continue;
            };
            put_row(w, "SO", |w| {
                w.write_word(name)?;
                w.write_word(&soper.classname)?;
                w.write_uint(u64::from(soper.flags.bits()))?;
                match &soper.password {
                    Some(password) => w.write_word(password),
                    None => Ok(()),
                }
            })?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Reading
    // ------------------------------------------------------------------------

    /// Apply every row; returns how many were read.
    pub(crate) fn read_rows<I>(&mut self, rows: I) -> Result<usize, DbError>
    where
        I: IntoIterator<Item = Result<FlatRow, DbError>>,
    {
        let mut count = 0;
        for row in rows {
            let mut row = row?;
            let kind = row.kind()?;
            match kind.as_str() {
                "DBV" => self.read_dbv(&mut row)?,
                "LUID" => {
                    let last = row.read_word()?.to_string();
                    self.resume_entity_ids(&last);
                }
                "CF" => self.read_cf(&mut row)?,
                "OC" => self.read_oc(&mut row)?,
                "MU" => self.read_mu(&mut row)?,
                "MDU" | "MDG" | "MDC" | "MDN" => self.read_md(&kind, &mut row)?,
                "ME" => self.read_me(&mut row)?,
                "MI" | "AC" | "MCFP" => self.read_account_list(&kind, &mut row)?,
                "MN" => self.read_mn(&mut row)?,
                "GRP" => self.read_grp(&mut row)?,
                "GACS" => self.read_gacs(&mut row)?,
                "MC" => self.read_mc(&mut row)?,
                "CA" => self.read_ca(&mut row)?,
                "MDA" => self.read_mda(&mut row)?,
                "NAM" => {
                    let name = row.read_word()?.to_string();
                    let _ = self.old_names.insert(
                        &name,
                        OldName {
                            name: name.clone(),
                            metadata: Metadata::new(),
                        },
                    );
                }
                "SO" => self.read_so(&mut row)?,
                other => warn!(line = row.line(), row = %other, "Skipping unknown snapshot row"),
            }
            count += 1;
        }
        Ok(count)
    }

    fn read_dbv(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let version = read_bits(row)?;
        if version > DB_VERSION {
            return Err(DbError::UnsupportedVersion(version));
        }
        Ok(())
    }

    fn read_cf(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let stored = row.read_word()?;
        let current = to_letters(self.policy.all());
        if stored != current {
            warn!(stored = %stored, current = %current, "Access flag set changed since snapshot was written");
        }
        Ok(())
    }

    fn read_oc(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let name = row.read_word()?.to_string();
        let flags = OperClassFlags::from_bits_truncate(read_bits(row)?) - OperClassFlags::BUILTIN;
        let privs = row.read_str()?;
        if self.operclass_find(&name).is_some() {
            debug!(class = %name, "Stored operator class shadowed by configuration");
            return Ok(());
        }
        self.operclass_add(&name, &privs, flags);
        Ok(())
    }

    fn read_mu(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let id = EntityId::new(row.read_word()?);
        let name = row.read_word()?.to_string();
        let pass = from_opt_word(row.read_word()?).unwrap_or_default();
        let email = from_opt_word(row.read_word()?).unwrap_or_default();
        let registered = row.read_time()?;
        let last_login = row.read_time()?;
        let flags = AccountFlags::from_bits_truncate(read_bits(row)?);
        let language = from_opt_word(row.read_word()?);

        let account = Account {
            email_canonical: self.canonicalize_email(&email),
            pass,
            email,
            registered,
            last_login,
            flags,
            language,
            ..Account::default()
        };
        let entity = Entity {
            id: id.clone(),
            name: name.clone(),
            data: EntityData::Account(Box::new(account)),
        };
        if !self.entity_put(entity) {
            warn!(line = row.line(), account = %name, id = %id, "Skipping duplicate account");
            return Ok(());
        }
        self.soper_bind(&name, &id);
        Ok(())
    }

    fn read_md(&mut self, kind: &str, row: &mut FlatRow) -> Result<(), DbError> {
        let owner = row.read_word()?.to_string();
        let key = row.read_word()?.to_string();
        let value = row.read_str()?;

        let target: Option<&mut Metadata> = match kind {
            "MDU" => self
                .account_id(&owner)
                .and_then(|id| self.account_mut(&id))
                .map(|a| &mut a.metadata),
            "MDG" => self
                .group_find(&owner)
                .map(|e| e.id.clone())
                .and_then(|id| self.group_mut(&id))
                .map(|g| &mut g.metadata),
            "MDC" if key == MD_MLOCK_EXT => {
                if let Some(reg) = self.channels.get_mut(&owner) {
                    reg.mlock.ext = value;
                    return Ok(());
                }
                None
            }
            "MDC" => self.channels.get_mut(&owner).map(|c| &mut c.metadata),
            _ => self.old_names.get_mut(&owner).map(|o| &mut o.metadata),
        };
        match target {
            Some(metadata) => {
                metadata.insert(key, value);
            }
            None => warn!(line = row.line(), row = %kind, owner = %owner, "Metadata for unknown record"),
        }
        Ok(())
    }

    fn read_me(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let owner = row.read_word()?.to_string();
        let sender = row.read_word()?.to_string();
        let sent = row.read_time()?;
        let status = read_bits(row)?;
        let text = row.read_str()?;

        let line = row.line();
        match self.account_id(&owner).and_then(|id| self.account_mut(&id)) {
            Some(account) => account.memos.push(Memo {
                sender,
                sent,
                status,
                text,
            }),
            None => warn!(line, account = %owner, "Memo for unknown account"),
        }
        Ok(())
    }

    fn read_account_list(&mut self, kind: &str, row: &mut FlatRow) -> Result<(), DbError> {
        let owner = row.read_word()?.to_string();
        let value = row.read_word()?.to_string();
        let Some(id) = self.account_id(&owner) else {
            warn!(line = row.line(), row = %kind, account = %owner, "Row for unknown account");
            return Ok(());
        };

        if kind == "MCFP" {
            if let Err(e) = self.certfp_add(&id, &value, true) {
                warn!(line = row.line(), account = %owner, error = %e, "Skipping certificate fingerprint");
            }
            return Ok(());
        }
        if let Some(account) = self.account_mut(&id) {
            match kind {
                "AC" => account.access_masks.push(value),
                _ => account.memo_ignores.push(value),
            }
        }
        Ok(())
    }

    fn read_mn(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let owner = row.read_word()?.to_string();
        let nick = row.read_word()?.to_string();
        let registered = row.read_time()?;
        let last_seen = row.read_time()?;

        let Some(owner_id) = self.account_id(&owner) else {
            warn!(line = row.line(), nick = %nick, account = %owner, "Nickname for unknown account");
            return Ok(());
        };
        if let Err(e) = self.nick_insert(Nick {
            nick: nick.clone(),
            owner: owner_id,
            registered,
            last_seen,
        }) {
            warn!(line = row.line(), nick = %nick, error = %e, "Skipping nickname");
        }
        Ok(())
    }

    fn read_grp(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let id = EntityId::new(row.read_word()?);
        let name = row.read_word()?.to_string();
        let registered = row.read_time()?;
        let flags = GroupFlags::from_bits_truncate(read_bits(row)?);

        let mut group = Group::new(registered);
        group.flags = flags;
        let entity = Entity {
            id,
            name: name.clone(),
            data: EntityData::Group(Box::new(group)),
        };
        if !self.entity_put(entity) {
            warn!(line = row.line(), group = %name, "Skipping duplicate group");
        }
        Ok(())
    }

    fn read_gacs(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let group = row.read_word()?.to_string();
        let member = EntityId::new(row.read_word()?);
        let flags = GroupAccessFlags::from_bits_truncate(read_bits(row)?);

        if !self.entities.contains_key(&member) {
            warn!(line = row.line(), group = %group, member = %member, "Membership of unknown entity");
            return Ok(());
        }
        let group_id = self.group_find(&group).map(|e| e.id.clone());
        match group_id.and_then(|id| self.group_mut(&id)) {
            Some(g) => g.members.push(GroupMember { member, flags }),
            None => warn!(line = row.line(), group = %group, "Membership in unknown group"),
        }
        Ok(())
    }

    fn read_mc(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let name = row.read_word()?.to_string();
        let registered = row.read_time()?;
        let used = row.read_time()?;
        let flags = ChannelFlags::from_bits_truncate(read_bits(row)?);
        let on = read_bits(row)?;
        let off = read_bits(row)?;
        let limit = read_bits(row)?;
        let key = from_opt_word(row.read_word()?);

        if let Err(e) = self.channel_add(&name) {
            warn!(line = row.line(), channel = %name, error = %e, "Skipping channel");
            return Ok(());
        }
        if let Some(reg) = self.channels.get_mut(&name) {
            reg.registered = registered;
            reg.used = used;
            reg.flags = flags;
            reg.mlock.on = on;
            reg.mlock.off = off;
            reg.mlock.limit = limit;
            reg.mlock.key = key;
        }
        Ok(())
    }

    /// Entity targets are stored by name; extended targets are recreated
    /// on demand and anything else is a hostmask.
    fn stored_target(&mut self, word: &str) -> AclTarget {
        if word.starts_with('$')
            && let Some(id) = self.exttarget_find_or_create(word)
        {
            return AclTarget::Entity(id);
        }
        match self.entity_find(word) {
            Some(entity) => AclTarget::Entity(entity.id.clone()),
            None => AclTarget::Host(word.to_string()),
        }
    }

    fn read_ca(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let channel = row.read_word()?.to_string();
        let target_word = row.read_word()?.to_string();
        let letters = row.read_word()?.to_string();
        let modified = row.read_time()?;
        let setter = from_opt_word(row.read_word()?).map(EntityId::new);

        let level = self.policy.flags_to_bitmask(&letters, AclFlags::empty());
        if level.is_empty() {
            warn!(line = row.line(), channel = %channel, target = %target_word, "Skipping empty access entry");
            return Ok(());
        }
        if !self.channels.contains(&channel) {
            warn!(line = row.line(), channel = %channel, "Access entry for unknown channel");
            return Ok(());
        }

        let target = self.stored_target(&target_word);
        let Some(id) = self.acl_add(&channel, target, level, setter) else {
            warn!(line = row.line(), channel = %channel, target = %target_word, "Skipping access entry");
            return Ok(());
        };
        if let Some(entry) = self.acl.get_mut(id) {
            entry.modified = modified;
        }
        Ok(())
    }

    fn read_mda(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let channel = row.read_word()?.to_string();
        let target_word = row.read_word()?.to_string();
        let key = row.read_word()?.to_string();
        let value = row.read_str()?;

        let target = self.stored_target(&target_word);
        let id: Option<AclId> = self
            .acl_entries(&channel)
            .find(|e| match (&e.target, &target) {
                (AclTarget::Host(a), AclTarget::Host(b)) => crate::casemap::irc_eq(a, b),
                (a, b) => a == b,
            })
            .map(|e| e.id);
        match id.and_then(|id| self.acl.get_mut(id)) {
            Some(entry) => {
                entry.metadata.insert(key, value);
            }
            None => {
                warn!(line = row.line(), channel = %channel, target = %target_word, "Metadata for unknown access entry");
                if let AclTarget::Entity(id) = &target {
                    self.release_if_unreferenced(id);
                }
            }
        }
        Ok(())
    }

    fn read_so(&mut self, row: &mut FlatRow) -> Result<(), DbError> {
        let name = row.read_word()?.to_string();
        let class = row.read_word()?.to_string();
        let flags = SoperFlags::from_bits_truncate(read_bits(row)?) - SoperFlags::CONF;
        let password = row.read_word().ok().map(str::to_string);

        if let Err(e) = self.soper_add(&name, &class, flags, password) {
            debug!(oper = %name, error = %e, "Stored services operator not restored");
        }
        Ok(())
    }
}
