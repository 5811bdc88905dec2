//! Channel access flags.
//!
//! Each access entry carries an [`AclFlags`] set. Flags are rendered as
//! single letters (`+vVotsriRfhHAFqabe`) or looked up by long name, and
//! a [`FlagPolicy`] narrows the universe to what the network supports.

use bitflags::bitflags;

bitflags! {
    /// Permission bits of a channel access entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct AclFlags: u32 {
        const VOICE       = 0x0000_0001;
        const AUTOVOICE   = 0x0000_0002;
        const OP          = 0x0000_0004;
        const AUTOOP      = 0x0000_0008;
        const TOPIC       = 0x0000_0010;
        const SET         = 0x0000_0020;
        const REMOVE      = 0x0000_0040;
        const INVITE      = 0x0000_0080;
        const RECOVER     = 0x0000_0100;
        /// May edit the access list.
        const FLAGS       = 0x0000_0200;
        const HALFOP      = 0x0000_0400;
        const AUTOHALFOP  = 0x0000_0800;
        const ACLVIEW     = 0x0000_1000;
        const FOUNDER     = 0x0000_2000;
        const USEPROTECT  = 0x0000_4000;
        const USEOWNER    = 0x0000_8000;
        const EXEMPT      = 0x0001_0000;
        /// Banned from the channel. Never counts as access.
        const AKICK       = 0x8000_0000;
    }
}

impl AclFlags {
    pub const VOP_DEF: Self = Self::VOICE.union(Self::AUTOVOICE).union(Self::ACLVIEW);
    pub const HOP_DEF: Self = Self::VOICE
        .union(Self::HALFOP)
        .union(Self::AUTOHALFOP)
        .union(Self::TOPIC)
        .union(Self::ACLVIEW);
    pub const AOP_DEF: Self = Self::VOICE
        .union(Self::HALFOP)
        .union(Self::OP)
        .union(Self::AUTOOP)
        .union(Self::TOPIC)
        .union(Self::ACLVIEW);
    pub const SOP_DEF: Self = Self::AOP_DEF
        .union(Self::SET)
        .union(Self::REMOVE)
        .union(Self::INVITE)
        .union(Self::EXEMPT);

    /// Flags a successor receives on top of whatever it already held.
    pub const SUCCESSOR_0: Self = Self::VOICE
        .union(Self::OP)
        .union(Self::AUTOOP)
        .union(Self::TOPIC)
        .union(Self::SET)
        .union(Self::REMOVE)
        .union(Self::INVITE)
        .union(Self::RECOVER)
        .union(Self::FLAGS)
        .union(Self::HALFOP)
        .union(Self::ACLVIEW)
        .union(Self::USEPROTECT)
        .union(Self::EXEMPT);
    pub const FOUNDER_0: Self = Self::SUCCESSOR_0
        .union(Self::FLAGS)
        .union(Self::USEOWNER)
        .union(Self::FOUNDER);
    /// Default grant for the registrant of a new channel.
    pub const INITIAL: Self = Self::FOUNDER_0.union(Self::AUTOOP);

    /// Flags whose holders keep a channel from idling out.
    pub const USEDUPDATE: Self = Self::VOICE
        .union(Self::OP)
        .union(Self::AUTOOP)
        .union(Self::SET)
        .union(Self::REMOVE)
        .union(Self::RECOVER)
        .union(Self::FLAGS)
        .union(Self::HALFOP)
        .union(Self::AUTOHALFOP)
        .union(Self::FOUNDER)
        .union(Self::USEPROTECT)
        .union(Self::USEOWNER);

    pub const HIGHPRIVS: Self = Self::SET.union(Self::RECOVER).union(Self::FLAGS);

    /// Every privilege bit; the ban bit is not a privilege.
    pub const ALLPRIVS: Self = Self::all().difference(Self::AKICK);

    /// Wire value used by snapshot rows and `make_bitmasks` when "everything"
    /// is requested. Masked down to the policy universe before use.
    pub const EVERYTHING: Self = Self::all();

    /// Turn op/halfop/voice into their automatic counterparts as well.
    pub fn with_auto(self) -> Self {
        let mut flags = self;
        if flags.contains(Self::OP) {
            flags |= Self::AUTOOP;
        }
        if flags.contains(Self::HALFOP) {
            flags |= Self::AUTOHALFOP;
        }
        if flags.contains(Self::VOICE) {
            flags |= Self::AUTOVOICE;
        }
        flags
    }
}

/// Letter, flag, long name and whether `*` grants it.
struct FlagInfo {
    letter: char,
    flag: AclFlags,
    name: &'static str,
    default: bool,
}

/// Ordered by letter so renderings are stable.
const FLAG_TABLE: &[FlagInfo] = &[
    FlagInfo { letter: 'A', flag: AclFlags::ACLVIEW, name: "acl-view", default: true },
    FlagInfo { letter: 'F', flag: AclFlags::FOUNDER, name: "founder", default: false },
    FlagInfo { letter: 'H', flag: AclFlags::AUTOHALFOP, name: "autohalfop", default: true },
    FlagInfo { letter: 'O', flag: AclFlags::AUTOOP, name: "autoop", default: true },
    FlagInfo { letter: 'R', flag: AclFlags::RECOVER, name: "recover", default: true },
    FlagInfo { letter: 'V', flag: AclFlags::AUTOVOICE, name: "autovoice", default: true },
    FlagInfo { letter: 'a', flag: AclFlags::USEPROTECT, name: "protect", default: true },
    FlagInfo { letter: 'b', flag: AclFlags::AKICK, name: "banned", default: false },
    FlagInfo { letter: 'e', flag: AclFlags::EXEMPT, name: "exempt", default: true },
    FlagInfo { letter: 'f', flag: AclFlags::FLAGS, name: "acl-change", default: true },
    FlagInfo { letter: 'h', flag: AclFlags::HALFOP, name: "halfop", default: true },
    FlagInfo { letter: 'i', flag: AclFlags::INVITE, name: "invite", default: true },
    FlagInfo { letter: 'o', flag: AclFlags::OP, name: "op", default: true },
    FlagInfo { letter: 'q', flag: AclFlags::USEOWNER, name: "owner", default: true },
    FlagInfo { letter: 'r', flag: AclFlags::REMOVE, name: "remove", default: true },
    FlagInfo { letter: 's', flag: AclFlags::SET, name: "set", default: true },
    FlagInfo { letter: 't', flag: AclFlags::TOPIC, name: "topic", default: true },
    FlagInfo { letter: 'v', flag: AclFlags::VOICE, name: "voice", default: true },
];

fn letter_flag(letter: char) -> Option<AclFlags> {
    FLAG_TABLE.iter().find(|f| f.letter == letter).map(|f| f.flag)
}

/// Look up a flag by its long name, case-insensitively.
pub fn flag_by_name(name: &str) -> Option<AclFlags> {
    FLAG_TABLE
        .iter()
        .find(|f| f.name.eq_ignore_ascii_case(name))
        .map(|f| f.flag)
}

/// Long name of a single flag.
pub fn flag_name(flag: AclFlags) -> Option<&'static str> {
    FLAG_TABLE.iter().find(|f| f.flag == flag).map(|f| f.name)
}

/// Actual outcome of a guarded access change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagDelta {
    pub added: AclFlags,
    pub removed: AclFlags,
}

impl FlagDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// The flag universe a deployment supports.
///
/// Halfop, protect and owner flags only exist when the network's
/// server software has the matching channel modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlagPolicy {
    all: AclFlags,
    all_enable: AclFlags,
}

impl Default for FlagPolicy {
    fn default() -> Self {
        Self::new(true, true, true)
    }
}

impl FlagPolicy {
    pub fn new(owner: bool, protect: bool, halfops: bool) -> Self {
        let mut all = AclFlags::all();
        if !halfops {
            all.remove(AclFlags::HALFOP | AclFlags::AUTOHALFOP);
        }
        if !protect {
            all.remove(AclFlags::USEPROTECT);
        }
        if !owner {
            all.remove(AclFlags::USEOWNER);
        }

        let all_enable = FLAG_TABLE
            .iter()
            .filter(|f| f.default)
            .fold(AclFlags::empty(), |acc, f| acc | f.flag);

        Self { all, all_enable }
    }

    /// Every flag an entry may hold.
    #[inline]
    pub fn all(&self) -> AclFlags {
        self.all
    }

    /// Flags granted by `*`.
    #[inline]
    pub fn all_enable(&self) -> AclFlags {
        self.all_enable
    }

    pub fn supports_owner(&self) -> bool {
        self.all.contains(AclFlags::USEOWNER)
    }

    /// Parse a change string like `+oO-v`, `=vV`, `-*` or `+voice` into
    /// the flags to add and remove. The two results never overlap.
    pub fn make_bitmasks(&self, letters: &str) -> FlagDelta {
        #[derive(PartialEq)]
        enum Dir {
            Add,
            Del,
        }

        let mut add = AclFlags::empty();
        let mut remove = AclFlags::empty();
        let mut dir = Dir::Add;
        let mut shortflag = false;

        for (idx, c) in letters.char_indices() {
            match c {
                '+' => dir = Dir::Add,
                '-' => dir = Dir::Del,
                '=' => {
                    add = AclFlags::empty();
                    remove = AclFlags::EVERYTHING;
                    dir = Dir::Add;
                }
                '*' => match dir {
                    Dir::Add => {
                        add = self.all_enable;
                        remove = AclFlags::AKICK;
                    }
                    Dir::Del => {
                        add = AclFlags::empty();
                        remove = AclFlags::EVERYTHING;
                    }
                },
                _ => {
                    // a long name consumes the rest of the string
                    if !shortflag && let Some(flag) = flag_by_name(&letters[idx..]) {
                        match dir {
                            Dir::Add => {
                                add |= flag;
                                remove.remove(flag);
                            }
                            Dir::Del => {
                                add.remove(flag);
                                remove |= flag;
                            }
                        }
                        break;
                    }
                    if let Some(flag) = letter_flag(c) {
                        match dir {
                            Dir::Add => {
                                add |= flag;
                                remove.remove(flag);
                            }
                            Dir::Del => {
                                add.remove(flag);
                                remove |= flag;
                            }
                        }
                    }
                    shortflag = true;
                }
            }
        }

        FlagDelta {
            added: add & self.all,
            removed: remove & self.all,
        }
    }

    /// Apply a change string to `base`, returning the resulting set.
    pub fn flags_to_bitmask(&self, letters: &str, base: AclFlags) -> AclFlags {
        let mut bitmask = base;
        let mut adding = true;

        for c in letters.chars() {
            match c {
                '+' => adding = true,
                '-' => adding = false,
                '=' => {
                    bitmask = AclFlags::empty();
                    adding = true;
                }
                '*' => {
                    if adding {
                        bitmask |= AclFlags::ALLPRIVS & self.all_enable & !AclFlags::FOUNDER;
                    } else {
                        bitmask = AclFlags::empty();
                    }
                }
                _ => {
                    if let Some(flag) = letter_flag(c) {
                        bitmask.set(flag, adding);
                    }
                }
            }
        }

        bitmask & self.all
    }

    /// Flags that a holder of `theirs` with `+f` may hand out.
    ///
    /// `limitflags` restricts non-founders on channels that opted in:
    /// without any high privilege only bans may be edited, and holders of
    /// only some high privileges cannot grant high privileges.
    pub fn allow_flags(&self, theirs: AclFlags, limitflags: bool) -> AclFlags {
        let mut flags = theirs - AclFlags::AKICK;
        if flags.contains(AclFlags::REMOVE) {
            flags |= AclFlags::AKICK;
        }
        flags = flags.with_auto();

        if limitflags {
            if !theirs.intersects(AclFlags::HIGHPRIVS - AclFlags::FLAGS) {
                flags &= AclFlags::AKICK;
            } else if !theirs.contains(AclFlags::HIGHPRIVS) {
                flags.remove(AclFlags::HIGHPRIVS);
            }
        }

        flags
    }
}

/// Render a set as `+letters`.
pub fn to_letters(flags: AclFlags) -> String {
    let mut out = String::from("+");
    out.extend(
        FLAG_TABLE
            .iter()
            .filter(|f| flags.contains(f.flag))
            .map(|f| f.letter),
    );
    out
}

/// Render a delta as `-removed+added`, omitting empty halves.
pub fn delta_letters(delta: FlagDelta) -> String {
    let mut out = String::new();
    if !delta.removed.is_empty() {
        out.push('-');
        out.extend(
            FLAG_TABLE
                .iter()
                .filter(|f| delta.removed.contains(f.flag))
                .map(|f| f.letter),
        );
    }
    if !delta.added.is_empty() {
        out.push('+');
        out.extend(
            FLAG_TABLE
                .iter()
                .filter(|f| delta.added.contains(f.flag))
                .map(|f| f.letter),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_nest() {
        assert!(AclFlags::SOP_DEF.contains(AclFlags::AOP_DEF));
        assert!(AclFlags::FOUNDER_0.contains(AclFlags::SUCCESSOR_0));
        assert!(AclFlags::INITIAL.contains(AclFlags::FOUNDER | AclFlags::AUTOOP));
        assert!(!AclFlags::ALLPRIVS.contains(AclFlags::AKICK));
    }

    #[test]
    fn letters_render_in_table_order() {
        assert_eq!(to_letters(AclFlags::VOP_DEF), "+AVv");
        assert_eq!(to_letters(AclFlags::empty()), "+");
        assert_eq!(to_letters(AclFlags::AKICK | AclFlags::FOUNDER), "+Fb");
    }

    #[test]
    fn make_bitmasks_short_flags() {
        let policy = FlagPolicy::default();
        let delta = policy.make_bitmasks("+oO-v");
        assert_eq!(delta.added, AclFlags::OP | AclFlags::AUTOOP);
        assert_eq!(delta.removed, AclFlags::VOICE);
    }

    #[test]
    fn make_bitmasks_later_flag_wins() {
        let policy = FlagPolicy::default();
        let delta = policy.make_bitmasks("+v-v");
        assert!(delta.added.is_empty());
        assert_eq!(delta.removed, AclFlags::VOICE);
    }

    #[test]
    fn make_bitmasks_long_name() {
        let policy = FlagPolicy::default();
        let delta = policy.make_bitmasks("+Acl-Change");
        assert_eq!(delta.added, AclFlags::FLAGS);
        let delta = policy.make_bitmasks("-founder");
        assert_eq!(delta.removed, AclFlags::FOUNDER);
    }

    #[test]
    fn make_bitmasks_star_and_equals() {
        let policy = FlagPolicy::default();
        let delta = policy.make_bitmasks("*");
        assert!(delta.added.contains(AclFlags::OP));
        assert!(!delta.added.contains(AclFlags::FOUNDER));
        assert_eq!(delta.removed, AclFlags::AKICK);

        let delta = policy.make_bitmasks("-*");
        assert!(delta.added.is_empty());
        assert_eq!(delta.removed, policy.all());

        let delta = policy.make_bitmasks("=v");
        assert_eq!(delta.added, AclFlags::VOICE);
        assert_eq!(delta.removed, policy.all() - AclFlags::VOICE);
    }

    #[test]
    fn policy_drops_unsupported_modes() {
        let policy = FlagPolicy::new(false, false, false);
        assert!(!policy.all().contains(AclFlags::USEOWNER));
        assert!(!policy.all().contains(AclFlags::HALFOP));
        assert!(!policy.supports_owner());
        let delta = policy.make_bitmasks("+qhv");
        assert_eq!(delta.added, AclFlags::VOICE);
    }

    #[test]
    fn flags_to_bitmask_applies_on_base() {
        let policy = FlagPolicy::default();
        let out = policy.flags_to_bitmask("-v+t", AclFlags::VOICE | AclFlags::OP);
        assert_eq!(out, AclFlags::OP | AclFlags::TOPIC);
        assert!(!policy.flags_to_bitmask("*", AclFlags::empty()).contains(AclFlags::FOUNDER));
    }

    #[test]
    fn allow_flags_expands_and_limits() {
        let policy = FlagPolicy::default();
        let allowed = policy.allow_flags(AclFlags::OP | AclFlags::REMOVE, false);
        assert!(allowed.contains(AclFlags::AUTOOP));
        assert!(allowed.contains(AclFlags::AKICK));

        // no high privileges: only bans may be touched
        let allowed = policy.allow_flags(AclFlags::OP | AclFlags::REMOVE | AclFlags::FLAGS, true);
        assert_eq!(allowed, AclFlags::AKICK);

        // partial high privileges: cannot grant them
        let allowed = policy.allow_flags(AclFlags::SET | AclFlags::FLAGS | AclFlags::OP, true);
        assert!(!allowed.intersects(AclFlags::HIGHPRIVS));
        assert!(allowed.contains(AclFlags::OP));
    }

    #[test]
    fn delta_rendering() {
        let delta = FlagDelta {
            added: AclFlags::OP,
            removed: AclFlags::VOICE,
        };
        assert_eq!(delta_letters(delta), "-v+o");
        assert_eq!(flag_name(AclFlags::FLAGS), Some("acl-change"));
    }
}
