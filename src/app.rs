//! The dialplan application verbs: `MeetMe`, `MeetMeCount`, `MeetMeAdmin`.
//!
//! These are the entry points a dialplan runtime wires its application table
//! to. Each takes the invocation's argument words, drives the admission
//! protocol (conference selection, PIN collection, retries), and hands the
//! call to the session loop.

use crate::{
    admin::{admin_exec, AdminCommand},
    channel::Call,
    conference::Conference,
    constants::MAX_ENTRY_ATTEMPTS,
    error::{Error, Result},
    participant::ConfFlags,
    rooms::Rooms,
    session, Registry,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Parses the single-character option string of the `MeetMe` verb.
#[must_use]
pub fn parse_options(options: &str) -> ConfFlags {
    let mut flags = ConfFlags::empty();
    for letter in options.chars() {
        flags.insert(match letter {
            'a' => ConfFlags::ADMIN,
            'A' => ConfFlags::MARKED,
            'b' => ConfFlags::BACKGROUND_SCRIPT,
            'c' => ConfFlags::ANNOUNCE_COUNT,
            'd' => ConfFlags::DYNAMIC,
            'D' => ConfFlags::DYNAMIC_PIN,
            'e' => ConfFlags::EMPTY,
            'E' => ConfFlags::EMPTY_NO_PIN,
            'i' => ConfFlags::INTRO_USER,
            'M' => ConfFlags::MOH,
            'm' => ConfFlags::MONITOR,
            'P' => ConfFlags::ALWAYS_PROMPT,
            'p' => ConfFlags::POUND_EXIT,
            'q' => ConfFlags::QUIET,
            'r' => ConfFlags::RECORD_CONF,
            's' => ConfFlags::STAR_MENU,
            'T' => ConfFlags::MONITOR_TALKER,
            't' => ConfFlags::TALKER,
            'v' => ConfFlags::VIDEO,
            'w' => ConfFlags::WAIT_MARKED,
            'x' => ConfFlags::MARKED_EXIT,
            'X' => ConfFlags::EXIT_CONTEXT,
            other => {
                warn!("unknown MeetMe option '{}'", other);
                continue;
            }
        });
    }
    flags
}

/// The `MeetMe(confno[, options[, pin]])` verb.
///
/// Returns 0 when the participant left through an explicit exit (`#`, exit
/// context, kick), -1 otherwise.
pub fn meetme_exec(call: &mut dyn Call, registry: &Registry, args: &[&str]) -> i32 {
    if args.len() > 3 {
        error!("syntax: MeetMe([confno[, options[, pin]]])");
        return -1;
    }

    let mut confno = args.first().copied().unwrap_or("").to_string();
    let mut allow_retry = confno.is_empty();
    let flags = args.get(1).map_or(ConfFlags::empty(), |o| parse_options(o));
    let preset_pin = args.get(2).copied().unwrap_or("").to_string();

    let dynamic = flags.intersects(ConfFlags::DYNAMIC | ConfFlags::DYNAMIC_PIN);
    let prompt_for_dynamic_pin = flags.contains(ConfFlags::DYNAMIC_PIN) && preset_pin.is_empty();
    let empty = flags.intersects(ConfFlags::EMPTY | ConfFlags::EMPTY_NO_PIN);
    let empty_no_pin = flags.contains(ConfFlags::EMPTY_NO_PIN);
    let always_prompt = flags.contains(ConfFlags::ALWAYS_PROMPT);

    if !call.is_up() && call.answer().is_err() {
        return -1;
    }

    let mut retries = 0;
    let mut res = -1;
    loop {
        if retries > MAX_ENTRY_ATTEMPTS {
            allow_retry = false;
        }

        if empty {
            let rooms = load_rooms(registry);
            match registry.next_empty(&rooms, dynamic, empty_no_pin) {
                Some(found) => {
                    confno = found;
                    if let Ok(n) = confno.parse::<i64>() {
                        if call.play_prompt("conf-enteringno").is_ok() {
                            let _ = call.say_digits(&n.to_string());
                        }
                    }
                }
                None => {
                    let _ = call.play_prompt("conf-noempty");
                }
            }
        }

        while allow_retry && confno.is_empty() {
            retries += 1;
            if retries >= MAX_ENTRY_ATTEMPTS + 1 {
                break;
            }
            match call.read_digits("conf-getconfno", 80) {
                Ok(digits) => confno = digits,
                Err(_) => {
                    allow_retry = false;
                    break;
                }
            }
        }

        if !confno.is_empty() {
            res = match find_conf(call, registry, &confno, true, dynamic, prompt_for_dynamic_pin) {
                Ok(Some(conf)) => {
                    admit_with_pin(call, registry, &conf, flags, &preset_pin, always_prompt, &mut allow_retry, &mut confno)
                }
                Ok(None) => {
                    let _ = call.play_prompt("conf-invalid");
                    if allow_retry {
                        confno.clear();
                    }
                    -1
                }
                // The caller went away while being prompted for a PIN.
                Err(e) => {
                    debug!("admission to {} aborted: {}", confno, e);
                    allow_retry = false;
                    -1
                }
            };
        }

        if !allow_retry || !confno.is_empty() {
            break;
        }
    }
    res
}

/// Resolves a conference: live registry entry, dynamic creation, or a
/// statically configured room.
///
/// Registry-level failures surface as `Ok(None)`, so the admission path
/// treats them exactly like an unknown number (spoken "conf-invalid",
/// retry permitted); `Err` is reserved for losing the caller mid-prompt.
fn find_conf(
    call: &mut dyn Call,
    registry: &Registry,
    confno: &str,
    make: bool,
    dynamic: bool,
    prompt_pin: bool,
) -> Result<Option<Arc<Conference>>> {
    if let Some(live) = registry.find(confno) {
        return Ok(Some(live));
    }

    if dynamic {
        debug!("building dynamic conference '{}'", confno);
        let pin = if prompt_pin {
            call.read_digits("conf-getpin", 80)?
        } else {
            String::new()
        };
        return Ok(surface_registry_result(
            registry.find_or_build(confno, &pin, "", make, true),
            confno,
        ));
    }

    let rooms = load_rooms(registry);
    match rooms.lookup(confno) {
        Some(room) => Ok(surface_registry_result(
            registry.find_or_build(confno, &room.pin, &room.admin_pin, make, false),
            confno,
        )),
        None => {
            debug!("{} isn't a valid conference", confno);
            Ok(None)
        }
    }
}

fn surface_registry_result(
    result: Result<Option<Arc<Conference>>>,
    confno: &str,
) -> Option<Arc<Conference>> {
    result.unwrap_or_else(|e| {
        warn!("could not build conference {}: {}", confno, e);
        None
    })
}

fn load_rooms(registry: &Registry) -> Rooms {
    match Rooms::load(&registry.config().rooms_file) {
        Ok(rooms) => rooms,
        Err(e) => {
            warn!(
                "no rooms file at {}: {}",
                registry.config().rooms_file.display(),
                e
            );
            Rooms::default()
        }
    }
}

/// Walks the PIN protocol, then runs the session.
#[allow(clippy::too_many_arguments)]
fn admit_with_pin(
    call: &mut dyn Call,
    registry: &Registry,
    conf: &Arc<Conference>,
    mut flags: ConfFlags,
    preset_pin: &str,
    always_prompt: bool,
    allow_retry: &mut bool,
    confno: &mut String,
) -> i32 {
    let needs_pin = (!conf.pin().is_empty() && !flags.contains(ConfFlags::ADMIN))
        || (!conf.admin_pin().is_empty() && flags.contains(ConfFlags::ADMIN));

    if !needs_pin {
        *allow_retry = false;
        return session::run(call, registry, conf, flags);
    }

    // A digit that interrupts the failure prompt seeds the next attempt.
    let mut seed = String::new();
    for _ in 0..MAX_ENTRY_ATTEMPTS {
        let entered = if !preset_pin.is_empty() && !always_prompt && seed.is_empty() {
            preset_pin.to_string()
        } else {
            match call.read_digits("conf-getpin", 80) {
                Ok(digits) => format!("{}{}", seed, digits),
                Err(_) => {
                    // Hangup while collecting: drop a conference nobody used.
                    registry.reap_if_empty(conf);
                    *allow_retry = false;
                    return -1;
                }
            }
        };

        let admin_match =
            !conf.admin_pin().is_empty() && entered.eq_ignore_ascii_case(conf.admin_pin());
        if admin_match || entered.eq_ignore_ascii_case(conf.pin()) {
            *allow_retry = false;
            if admin_match {
                flags.insert(ConfFlags::ADMIN);
            }
            return session::run(call, registry, conf, flags);
        }

        seed.clear();
        match call.play_prompt("conf-invalidpin") {
            Ok(Some(digit)) => seed.push(digit),
            Ok(None) => {}
            Err(_) => break,
        }
        if *allow_retry {
            confno.clear();
        }
        if !preset_pin.is_empty() && !always_prompt {
            break;
        }
    }
    registry.reap_if_empty(conf);
    -1
}

/// The `MeetMeCount(confno[, var])` verb: counts participants into a
/// variable, or speaks the count.
pub fn count_exec(call: &mut dyn Call, registry: &Registry, args: &[&str]) -> i32 {
    if args.is_empty() || args.len() > 2 {
        error!("syntax: MeetMeCount(confno[, var])");
        return -1;
    }

    let count = registry.find(args[0]).map_or(0, |c| c.user_count());

    match args.get(1) {
        Some(var) if !var.is_empty() => {
            call.set_var(var, &count.to_string());
            0
        }
        _ => {
            if !call.is_up() && call.answer().is_err() {
                return -1;
            }
            match call.say_number(count as i64) {
                Ok(_) => 0,
                Err(_) => -1,
            }
        }
    }
}

/// The `MeetMeAdmin(confno, command[, user])` verb.
pub fn meetme_admin_exec(registry: &Registry, args: &[&str]) -> i32 {
    if args.len() < 2 || args.len() > 3 {
        error!("syntax: MeetMeAdmin(confno, command[, user])");
        return -1;
    }

    let command = match args[1].chars().next().and_then(AdminCommand::from_letter) {
        Some(cmd) => cmd,
        None => {
            error!("unknown admin command '{}'", args[1]);
            return -1;
        }
    };

    match admin_exec(registry, args[0], command, args.get(2).copied()) {
        Ok(()) => 0,
        Err(Error::InvalidInput(what)) => {
            warn!("{}", what);
            0
        }
        Err(e) => {
            warn!("admin command failed: {}", e);
            -1
        }
    }
}
