//! The `meetme` console command: conference tables, participant listings,
//! and friendly-verb admin dispatch.
//!
//! The host CLI framework owns line editing and help; this module renders
//! output text and offers completion candidates.

use crate::{
    admin::{admin_exec, AdminCommand},
    error::{Error, Result},
    participant::{AdminFlags, ConfFlags, TalkState},
    Registry,
};
use std::fmt::Write;

const SUBCOMMANDS: [&str; 6] = ["lock", "unlock", "mute", "unmute", "kick", "list"];

/// Executes one `meetme` CLI invocation (`args` excludes the word `meetme`
/// itself) and returns the text to print.
pub fn exec(registry: &Registry, args: &[&str]) -> Result<String> {
    match args {
        [] => Ok(render_conference_table(registry)),
        ["list", confno] => render_participant_list(registry, confno),
        ["lock", confno] => run_admin(registry, confno, AdminCommand::Lock, None),
        ["unlock", confno] => run_admin(registry, confno, AdminCommand::Unlock, None),
        ["mute", confno, "all"] => run_admin(registry, confno, AdminCommand::MuteAllNonAdmin, None),
        ["mute", confno, user] => run_admin(registry, confno, AdminCommand::Mute, Some(user)),
        ["unmute", confno, "all"] => {
            run_admin(registry, confno, AdminCommand::UnmuteAllNonAdmin, None)
        }
        ["unmute", confno, user] => run_admin(registry, confno, AdminCommand::Unmute, Some(user)),
        ["kick", confno, "all"] => run_admin(registry, confno, AdminCommand::KickAll, None),
        ["kick", confno, user] => run_admin(registry, confno, AdminCommand::Kick, Some(user)),
        _ => Err(Error::InvalidInput(
            "usage: meetme (un)lock|(un)mute|kick|list <confno> [<usernumber>|all]".to_string(),
        )),
    }
}

fn run_admin(
    registry: &Registry,
    confno: &str,
    command: AdminCommand,
    user: Option<&str>,
) -> Result<String> {
    admin_exec(registry, confno, command, user)?;
    Ok(String::new())
}

fn render_conference_table(registry: &Registry) -> String {
    let summaries = registry.summaries();
    if summaries.is_empty() {
        return "No active MeetMe conferences.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<14} {:<14} {:<10} {:<8}  {:<8}",
        "Conf Num", "Parties", "Marked", "Activity", "Creation"
    );
    let mut total = 0;
    for s in &summaries {
        let marked = if s.marked == 0 {
            "N/A ".to_string()
        } else {
            format!("{:04}", s.marked)
        };
        let (hr, min, sec) = (s.age_secs / 3600, (s.age_secs % 3600) / 60, s.age_secs % 60);
        let _ = writeln!(
            out,
            "{:<12.12}   {:04}          {:4.4}       {:02}:{:02}:{:02}  {:<8}",
            s.confno,
            s.parties,
            marked,
            hr,
            min,
            sec,
            if s.is_dynamic { "Dynamic" } else { "Static" }
        );
        total += s.parties;
    }
    let _ = writeln!(out, "* Total number of MeetMe users: {}", total);
    out
}

fn render_participant_list(registry: &Registry, confno: &str) -> Result<String> {
    let conf = registry
        .find(confno)
        .ok_or_else(|| Error::InvalidInput(format!("No such conference: {}.", confno)))?;

    let mut out = String::new();
    for p in conf.participants() {
        let flags = p.flags();
        let _ = writeln!(
            out,
            "User #: {:02} {:>12.12} {:<20.20} Channel: {} {} {} {} {}",
            p.user_no(),
            p.caller_id().unwrap_or("<unknown>"),
            p.caller_name().unwrap_or("<no name>"),
            p.channel(),
            if flags.contains(ConfFlags::ADMIN) {
                "(Admin)"
            } else {
                ""
            },
            if flags.contains(ConfFlags::MONITOR) {
                "(Listen only)"
            } else {
                ""
            },
            if p.admin_flags().contains(AdminFlags::MUTED) {
                "(Admn Muted)"
            } else {
                ""
            },
            talking_label(p.talk_state()),
        );
    }
    let _ = writeln!(out, "{} users in that conference.", conf.user_count());
    Ok(out)
}

fn talking_label(state: TalkState) -> &'static str {
    match state {
        TalkState::Talking => "(talking)",
        TalkState::Unmonitored => "(unmonitored)",
        TalkState::Silent => "(not talking)",
    }
}

/// Completion candidates for the word at `args.len() - 1`; earlier words are
/// complete, the final word is the partial being typed (possibly empty).
#[must_use]
pub fn complete(registry: &Registry, args: &[&str]) -> Vec<String> {
    let (done, partial) = match args.split_last() {
        Some((last, rest)) => (rest, *last),
        None => return Vec::new(),
    };

    match done.len() {
        // Subcommand.
        0 => SUBCOMMANDS
            .iter()
            .filter(|c| c.starts_with(partial))
            .map(|c| (*c).to_string())
            .collect(),
        // Conference number.
        1 => registry
            .snapshot()
            .into_iter()
            .map(|c| c.confno().to_string())
            .filter(|c| c.starts_with(partial))
            .collect(),
        // Participant number, or `all` for mute/unmute/kick.
        2 if matches!(done[0], "mute" | "unmute" | "kick") => {
            let mut candidates = Vec::new();
            if "all".starts_with(partial) {
                candidates.push("all".to_string());
            }
            if let Some(conf) = registry.find(done[1]) {
                candidates.extend(
                    conf.participants()
                        .iter()
                        .map(|p| p.user_no().to_string())
                        .filter(|n| n.starts_with(partial)),
                );
            }
            candidates
        }
        _ => Vec::new(),
    }
}
