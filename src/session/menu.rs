//! The star menu: per-participant controls behind `*`, with an extended
//! variant for admins.
//!
//! While the menu is armed, the participant is detached from the mix so
//! keypresses and prompts stay private; the conference binding and any
//! driver-absorbed gain are restored on the way out.

use super::{Abort, Flow, Session};
use crate::{
    channel::Gain,
    mixer::ConfMode,
    participant::{AdminFlags, ConfFlags, VolumeAction},
};

impl<'a> Session<'a> {
    /// Runs one menu interaction triggered by `digit`.
    pub(super) fn star_menu(&mut self, digit: char) -> Flow {
        if !self.detach_mode() {
            return Err(Abort);
        }

        // A driver-absorbed talk gain would color the menu prompts; zero it
        // for the duration.
        if !self.menu_active && self.talk.desired != 0 && self.talk.actual == 0 {
            let _ = self.call.set_gain(Gain::Talk, 0);
        }
        if self.music_on_hold {
            self.call.moh_stop();
        }

        if self.flags.contains(ConfFlags::ADMIN) {
            self.admin_menu(digit)?;
        } else {
            self.user_menu(digit)?;
        }

        if self.music_on_hold {
            self.call.moh_start();
        }

        if !self.apply_mode() {
            return Err(Abort);
        }
        if let Some(port) = self.port.as_mut() {
            let _ = port.flush();
        }
        Ok(())
    }

    /// First entry plays the menu prompt and takes one digit; while the menu
    /// stays armed, later digits are consumed directly.
    fn menu_digit(&mut self, prompt: &str, digit: char) -> Option<char> {
        if self.menu_active {
            Some(digit)
        } else {
            self.menu_active = true;
            self.call.play_prompt(prompt).unwrap_or(None)
        }
    }

    fn user_menu(&mut self, digit: char) -> Flow {
        let selected = match self.menu_digit("conf-usermenu", digit) {
            Some(d) => d,
            None => return Ok(()),
        };
        match selected {
            '1' => self.toggle_self_mute(false)?,
            '4' => self.tweak_listen(VolumeAction::Down),
            '6' => self.tweak_listen(VolumeAction::Up),
            '7' => self.tweak_talk(VolumeAction::Down),
            '8' => self.menu_active = false,
            '9' => self.tweak_talk(VolumeAction::Up),
            _ => self.unknown_selection()?,
        }
        Ok(())
    }

    fn admin_menu(&mut self, digit: char) -> Flow {
        let selected = match self.menu_digit("conf-adminmenu", digit) {
            Some(d) => d,
            None => return Ok(()),
        };
        match selected {
            '1' => self.toggle_self_mute(true)?,
            '2' => self.toggle_lock()?,
            '3' => self.eject_last()?,
            '4' => self.tweak_listen(VolumeAction::Down),
            '5' => self.toggle_self_marked(),
            '6' => self.tweak_listen(VolumeAction::Up),
            '7' => self.tweak_talk(VolumeAction::Down),
            '9' => self.tweak_talk(VolumeAction::Up),
            _ => self.unknown_selection()?,
        }
        Ok(())
    }

    fn unknown_selection(&mut self) -> Flow {
        self.menu_active = false;
        self.prompt("conf-errormenu")?;
        Ok(())
    }

    /// Mute/unmute self. Non-admins may not undo an admin-imposed mute.
    fn toggle_self_mute(&mut self, admin: bool) -> Flow {
        self.menu_active = false;
        if self.mode.contains(ConfMode::TALKER) {
            self.mode = ConfMode::CONF | ConfMode::LISTENER;
            self.flags.insert(ConfFlags::MONITOR | ConfFlags::TALKER);
        } else if admin || !self.me.admin_flags().contains(AdminFlags::MUTED) {
            self.mode = ConfMode::CONF | ConfMode::TALKER | ConfMode::LISTENER;
            self.flags.toggle(ConfFlags::MONITOR | ConfFlags::TALKER);
        }
        if !self.apply_mode() {
            self.ret = -1;
        }
        if self.mode.contains(ConfMode::TALKER) {
            self.prompt("conf-unmuted")?;
        } else {
            self.prompt("conf-muted")?;
        }
        Ok(())
    }

    fn toggle_lock(&mut self) -> Flow {
        self.menu_active = false;
        if self.conf.is_locked() {
            self.conf.set_locked(false);
            self.prompt("conf-unlockednow")?;
        } else {
            self.conf.set_locked(true);
            self.prompt("conf-lockednow")?;
        }
        Ok(())
    }

    fn eject_last(&mut self) -> Flow {
        self.menu_active = false;
        if let Some(last) = self.conf.last_participant() {
            if last.channel() == self.call.name() || last.is_admin() {
                self.prompt("conf-errormenu")?;
            } else {
                last.raise_admin_flags(AdminFlags::KICK_ME);
            }
        }
        Ok(())
    }

    /// Toggle the admin's own marked status.
    ///
    /// The counter moves both ways; the un-mark arm leaves the flag set.
    fn toggle_self_marked(&mut self) {
        if !self.flags.contains(ConfFlags::MARKED) {
            self.conf.bump_marked(1);
            self.flags.toggle(ConfFlags::MARKED);
        } else {
            self.conf.bump_marked(-1);
            self.flags.insert(ConfFlags::MARKED);
        }
    }
}
