//! The administrative command plane.
//!
//! Commands address a conference by number and, where applicable, one
//! participant by user number. They only flip counters, the lock bit, and
//! per-participant admin flags; target sessions observe the change on their
//! next loop iteration, within one frame period.

use crate::{
    conference::Conference,
    error::{Error, Result},
    participant::AdminFlags,
    Registry,
};
use std::sync::Arc;
use tracing::debug;

/// One admin-plane command.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AdminCommand {
    /// Lock the conference against new admission.
    Lock,
    /// Unlock the conference.
    Unlock,
    /// Kick every participant.
    KickAll,
    /// Kick one participant.
    Kick,
    /// Kick the most recent joiner, refusing when that is an admin.
    EjectLast,
    /// Mute one participant (admins included).
    Mute,
    /// Mute every non-admin participant.
    MuteAllNonAdmin,
    /// Unmute one participant.
    Unmute,
    /// Unmute every muted non-admin participant.
    UnmuteAllNonAdmin,
}

impl AdminCommand {
    /// Decodes the classic one-letter command encoding.
    #[must_use]
    pub fn from_letter(letter: char) -> Option<Self> {
        Some(match letter {
            'L' => AdminCommand::Lock,
            'l' => AdminCommand::Unlock,
            'K' => AdminCommand::KickAll,
            'k' => AdminCommand::Kick,
            'e' => AdminCommand::EjectLast,
            'M' => AdminCommand::Mute,
            'N' => AdminCommand::MuteAllNonAdmin,
            'm' => AdminCommand::Unmute,
            'n' => AdminCommand::UnmuteAllNonAdmin,
            _ => return None,
        })
    }

    /// Whether this command needs a participant argument.
    #[must_use]
    pub fn needs_user(self) -> bool {
        matches!(
            self,
            AdminCommand::Kick | AdminCommand::Mute | AdminCommand::Unmute
        )
    }
}

/// Executes one admin command against a live conference.
pub fn admin_exec(
    registry: &Registry,
    confno: &str,
    command: AdminCommand,
    user: Option<&str>,
) -> Result<()> {
    let conf = registry
        .find(confno)
        .ok_or_else(|| Error::InvalidInput(format!("conference {} not found", confno)))?;

    let target = match user {
        Some(ident) if command.needs_user() => Some(find_user(&conf, ident)?),
        None if command.needs_user() => {
            return Err(Error::InvalidInput(format!(
                "{:?} requires a participant number",
                command
            )))
        }
        _ => None,
    };

    match command {
        AdminCommand::Lock => conf.set_locked(true),
        AdminCommand::Unlock => conf.set_locked(false),
        AdminCommand::KickAll => {
            for p in conf.participants() {
                p.raise_admin_flags(AdminFlags::KICK_ME);
            }
        }
        AdminCommand::Kick => {
            if let Some(p) = target {
                p.raise_admin_flags(AdminFlags::KICK_ME);
            }
        }
        AdminCommand::EjectLast => {
            let last = conf
                .last_participant()
                .ok_or_else(|| Error::InvalidInput("conference is empty".to_string()))?;
            if last.is_admin() {
                debug!("not kicking participant {}: is an admin", last.user_no());
                return Err(Error::InvalidInput(
                    "last participant is an admin".to_string(),
                ));
            }
            last.raise_admin_flags(AdminFlags::KICK_ME);
        }
        AdminCommand::Mute => {
            if let Some(p) = target {
                p.raise_admin_flags(AdminFlags::MUTED);
            }
        }
        AdminCommand::MuteAllNonAdmin => {
            for p in conf.participants() {
                if !p.is_admin() {
                    p.raise_admin_flags(AdminFlags::MUTED);
                }
            }
        }
        AdminCommand::Unmute => {
            let p = target.expect("needs_user command resolved above");
            if !p.admin_flags().contains(AdminFlags::MUTED) {
                return Err(Error::InvalidInput(format!(
                    "participant {} is not admin-muted",
                    p.user_no()
                )));
            }
            p.clear_admin_flags(AdminFlags::MUTED);
        }
        AdminCommand::UnmuteAllNonAdmin => {
            for p in conf.participants() {
                if p.admin_flags().contains(AdminFlags::MUTED) {
                    p.clear_admin_flags(AdminFlags::MUTED);
                }
            }
        }
    }
    Ok(())
}

fn find_user(conf: &Arc<Conference>, ident: &str) -> Result<Arc<crate::participant::Participant>> {
    let user_no: u32 = ident
        .parse()
        .map_err(|_| Error::InvalidInput(format!("bad participant number '{}'", ident)))?;
    conf.participant(user_no)
        .ok_or_else(|| Error::InvalidInput(format!("participant {} not found", user_no)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::testutil::ScriptedCall;
    use crate::config::Config;
    use crate::mixer::testutil::TestMixer;
    use crate::participant::ConfFlags;

    fn setup() -> (Registry, Arc<Conference>) {
        let registry = Registry::new(Arc::new(TestMixer::new()), Config::default());
        let conf = registry
            .find_or_build("900", "", "", false, true)
            .unwrap()
            .unwrap();
        let call = ScriptedCall::new("TEST/x-1", "9.1");
        conf.admit(&call, ConfFlags::ADMIN);
        conf.admit(&call, ConfFlags::empty());
        conf.admit(&call, ConfFlags::empty());
        conf.admit(&call, ConfFlags::empty());
        (registry, conf)
    }

    #[test]
    fn letters_round_trip() {
        for (letter, cmd) in [
            ('L', AdminCommand::Lock),
            ('l', AdminCommand::Unlock),
            ('K', AdminCommand::KickAll),
            ('k', AdminCommand::Kick),
            ('e', AdminCommand::EjectLast),
            ('M', AdminCommand::Mute),
            ('N', AdminCommand::MuteAllNonAdmin),
            ('m', AdminCommand::Unmute),
            ('n', AdminCommand::UnmuteAllNonAdmin),
        ]
        .iter()
        .copied()
        {
            assert_eq!(AdminCommand::from_letter(letter), Some(cmd));
        }
        assert_eq!(AdminCommand::from_letter('z'), None);
    }

    #[test]
    fn lock_and_unlock_flip_the_conference() {
        let (registry, conf) = setup();
        admin_exec(&registry, "900", AdminCommand::Lock, None).unwrap();
        assert!(conf.is_locked());
        admin_exec(&registry, "900", AdminCommand::Unlock, None).unwrap();
        assert!(!conf.is_locked());
    }

    #[test]
    fn mute_all_exempts_admins_but_targeted_mute_does_not() {
        let (registry, conf) = setup();
        admin_exec(&registry, "900", AdminCommand::MuteAllNonAdmin, None).unwrap();
        let muted: Vec<u32> = conf
            .participants()
            .iter()
            .filter(|p| p.admin_flags().contains(AdminFlags::MUTED))
            .map(|p| p.user_no())
            .collect();
        assert_eq!(muted, vec![2, 3, 4]);

        admin_exec(&registry, "900", AdminCommand::Mute, Some("1")).unwrap();
        assert!(conf
            .participant(1)
            .unwrap()
            .admin_flags()
            .contains(AdminFlags::MUTED));
    }

    #[test]
    fn unmute_requires_an_existing_mute() {
        let (registry, conf) = setup();
        assert!(admin_exec(&registry, "900", AdminCommand::Unmute, Some("2")).is_err());

        admin_exec(&registry, "900", AdminCommand::Mute, Some("2")).unwrap();
        admin_exec(&registry, "900", AdminCommand::Unmute, Some("2")).unwrap();
        assert!(conf.participant(2).unwrap().admin_flags().is_empty());
    }

    #[test]
    fn eject_last_refuses_admin_tail() {
        let (registry, conf) = setup();
        admin_exec(&registry, "900", AdminCommand::EjectLast, None).unwrap();
        assert!(conf
            .participant(4)
            .unwrap()
            .admin_flags()
            .contains(AdminFlags::KICK_ME));

        // Simulate 4 leaving, then 3; the tail becomes the admin.
        conf.remove(4, false);
        admin_exec(&registry, "900", AdminCommand::EjectLast, None).unwrap();
        conf.remove(3, false);
        conf.remove(2, false);
        assert!(admin_exec(&registry, "900", AdminCommand::EjectLast, None).is_err());
    }

    #[test]
    fn kick_all_flags_everyone() {
        let (registry, conf) = setup();
        admin_exec(&registry, "900", AdminCommand::KickAll, None).unwrap();
        assert!(conf
            .participants()
            .iter()
            .all(|p| p.admin_flags().contains(AdminFlags::KICK_ME)));
    }

    #[test]
    fn unknown_conference_and_user_are_invalid_input() {
        let (registry, _conf) = setup();
        assert!(matches!(
            admin_exec(&registry, "999", AdminCommand::Lock, None),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            admin_exec(&registry, "900", AdminCommand::Kick, Some("42")),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            admin_exec(&registry, "900", AdminCommand::Kick, Some("x")),
            Err(Error::InvalidInput(_))
        ));
    }
}
