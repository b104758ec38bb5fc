//! Built-in grammars.
//!
//! Each preset is a thin pattern table for one game server's log format.
//! Names are listed in [`logrelay_core::config::GRAMMAR_PRESETS`] so the
//! config layer can validate them without depending on this crate.

use super::grammar::{GrammarSpec, RuleKind, RuleSpec};
use super::heuristic::SpeakerHeuristic;

/// Returns the [`GrammarSpec`] for a preset name.
pub fn preset(name: &str) -> Option<GrammarSpec> {
    let spec = match name {
        "armagetron" => armagetron(),
        "quake3" => quake3(),
        "halflife" => halflife(),
        "aceofspades" => aceofspades(),
        "doom3" => doom3(),
        "minecraft-beta" => minecraft_beta(),
        "mumble" => mumble(),
        _ => return None,
    };
    Some(spec)
}

/// All preset names.
pub fn preset_names() -> &'static [&'static str] {
    logrelay_core::config::GRAMMAR_PRESETS
}

fn build(
    name: &str,
    case_insensitive: bool,
    strip_color_codes: bool,
    heuristic: Option<SpeakerHeuristic>,
    rules: &[(RuleKind, &str)],
) -> GrammarSpec {
    GrammarSpec {
        name: name.to_owned(),
        case_insensitive,
        strip_color_codes,
        heuristic,
        rules: rules
            .iter()
            .map(|(kind, pattern)| RuleSpec::new(*kind, *pattern))
            .collect(),
    }
}

/// Armagetron Advanced console log. The generic `[id] name: msg` chat
/// shape also matches server diagnostics, hence the speaker heuristic.
fn armagetron() -> GrammarSpec {
    build(
        "armagetron",
        true,
        false,
        Some(SpeakerHeuristic::standard()),
        &[
            (
                RuleKind::Join,
                r"^\[(?P<id>\d+)\]\s+(?P<name>.+?)\s+entered the game\.?\s*$",
            ),
            (
                RuleKind::Leave,
                r"^\[(?P<id>\d+)\]\s+(?P<name>.+?)\s+left the game\.?\s*$",
            ),
            (
                RuleKind::LeaveById,
                r"^\[\d+\]\s+received logout from\s+(?P<id>\d+)\.?",
            ),
            (RuleKind::LeaveById, r"^\[\d+\]\s+Killing user\s+(?P<id>\d+)\b"),
            (
                RuleKind::Chat,
                r"^\[(?P<id>\d+)\]\s+(?P<name>.+?):\s(?P<message>.*)$",
            ),
        ],
    )
}

/// Quake III Arena / Jedi Knight 2 `games.log`.
fn quake3() -> GrammarSpec {
    build(
        "quake3",
        false,
        true,
        None,
        &[
            (
                RuleKind::Join,
                r#"broadcast: print "(?P<name>.+?) entered the game\\n""#,
            ),
            (
                RuleKind::Join,
                r#"broadcast: print "(?P<name>.*?) @@@PLCONNECT""#,
            ),
            (
                RuleKind::Leave,
                r#"broadcast: print "(?P<name>.+?) disconnected\\n""#,
            ),
            (
                RuleKind::Leave,
                r#"broadcast: print "(?P<name>.*?) @@@DISCONNECTED""#,
            ),
            (RuleKind::Chat, r"say: (?P<name>.+?): (?P<message>.+)"),
        ],
    )
}

/// GoldSrc / Source engine `L mm/dd/yyyy - hh:mm:ss:` logs.
fn halflife() -> GrammarSpec {
    build(
        "halflife",
        false,
        false,
        None,
        &[
            (
                RuleKind::Join,
                r#"^L \d+/\d+/\d+ - \d+:\d+:\d+: "(?P<name>.+?)<(?P<id>\d+)><[^>]*><[^>]*>" connected, address "(?P<ip>[^":]*)(?::\d+)?""#,
            ),
            (
                RuleKind::Leave,
                r#"^L \d+/\d+/\d+ - \d+:\d+:\d+: "(?P<name>.+?)<(?P<id>\d+)><[^>]*><[^>]*>" disconnected"#,
            ),
            (
                RuleKind::Chat,
                r#"^L \d+/\d+/\d+ - \d+:\d+:\d+: "(?P<name>.+?)<(?P<id>\d+)><[^>]*><[^>]*>" say "(?P<message>.*)""#,
            ),
        ],
    )
}

/// piqueserver (Ace of Spades).
fn aceofspades() -> GrammarSpec {
    build(
        "aceofspades",
        false,
        false,
        None,
        &[
            (
                RuleKind::Join,
                r"\[piqueserver\.player#info\] (?P<name>\S+) \(IP (?P<ip>[\d.]+), ID (?P<id>\d+)\) entered the game!",
            ),
            (
                RuleKind::Leave,
                r"\[piqueserver\.player#info\] (?P<name>\S+) disconnected!",
            ),
            (
                RuleKind::Chat,
                r"\[piqueserver\.player#info\] <(?P<name>[^>]+)> (?P<message>.+)",
            ),
        ],
    )
}

/// Doom 3 dedicated server console log.
fn doom3() -> GrammarSpec {
    build(
        "doom3",
        false,
        false,
        None,
        &[
            (RuleKind::Join, r"^Server: (?P<name>.+?) joined the game\.$"),
            (RuleKind::Leave, r"^(?P<name>.+?) disconnected\.$"),
            (RuleKind::Chat, r"^(?P<name>[^:]+): (?P<message>.+)$"),
        ],
    )
}

/// Minecraft Beta `server.log`.
fn minecraft_beta() -> GrammarSpec {
    build(
        "minecraft-beta",
        false,
        false,
        None,
        &[
            (
                RuleKind::Join,
                r"\[INFO\] (?P<name>\w+) \[/(?P<ip>[\d.]+)(?::\d+)?\] logged in with entity id \d+ at",
            ),
            (RuleKind::Leave, r"\[INFO\] (?P<name>\w+) lost connection: .+"),
            (RuleKind::Chat, r"\[INFO\] <(?P<name>\w+)> (?P<message>.+)"),
        ],
    )
}

/// Murmur (Mumble server) log. Murmur does not log chat.
fn mumble() -> GrammarSpec {
    build(
        "mumble",
        false,
        false,
        None,
        &[
            (
                RuleKind::Join,
                r"<(?P<id>\d+):(?P<name>.+?)\(-?\d+\)> Authenticated",
            ),
            (
                RuleKind::Leave,
                r"<(?P<id>\d+):(?P<name>.+?)\(-?\d+\)> Connection closed",
            ),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::grammar::Grammar;

    fn compiled(name: &str) -> Grammar {
        Grammar::from_spec(preset(name).unwrap()).unwrap()
    }

    fn kind_of(grammar: &Grammar, line: &str) -> Option<RuleKind> {
        grammar.match_line(line).and_then(|m| m.kind)
    }

    #[test]
    fn every_listed_preset_compiles() {
        for name in preset_names() {
            let spec = preset(name).unwrap_or_else(|| panic!("missing preset {name}"));
            assert_eq!(spec.name, *name);
            Grammar::from_spec(spec).unwrap();
        }
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(preset("tetris").is_none());
    }

    #[test]
    fn armagetron_lines() {
        let g = compiled("armagetron");
        let m = g.match_line("[7] Alice entered the game.").unwrap();
        assert_eq!(m.kind, Some(RuleKind::Join));
        assert_eq!(m.id, Some(7));
        assert_eq!(m.name.as_deref(), Some("Alice"));

        assert_eq!(
            kind_of(&g, "[7] Alice LEFT THE GAME"),
            Some(RuleKind::Leave)
        );
        let m = g.match_line("[0] received logout from 7.").unwrap();
        assert_eq!(m.kind, Some(RuleKind::LeaveById));
        assert_eq!(m.id, Some(7));
        assert_eq!(
            kind_of(&g, "[0] Killing user 4, reason: kicked"),
            Some(RuleKind::LeaveById)
        );
        assert_eq!(kind_of(&g, "[3] Bob: hello there"), Some(RuleKind::Chat));
        assert_eq!(kind_of(&g, "[3] 192.168.0.5: hello"), None);
        assert_eq!(kind_of(&g, "[0] Sending ping: 34ms"), None);
    }

    #[test]
    fn quake3_lines_strip_colors() {
        let g = compiled("quake3");
        let m = g
            .match_line(r#"  1:02 broadcast: print "^1Sarge^7 entered the game\n""#)
            .unwrap();
        assert_eq!(m.kind, Some(RuleKind::Join));
        assert_eq!(m.name.as_deref(), Some("Sarge"));

        let m = g.match_line("  1:05 say: ^4Doom: gg").unwrap();
        assert_eq!(m.kind, Some(RuleKind::Chat));
        assert_eq!(m.name.as_deref(), Some("Doom"));
        assert_eq!(m.message.as_deref(), Some("gg"));

        assert_eq!(
            kind_of(&g, r#"broadcast: print "Kyle @@@DISCONNECTED""#),
            Some(RuleKind::Leave)
        );
    }

    #[test]
    fn halflife_lines() {
        let g = compiled("halflife");
        let m = g
            .match_line(r#"L 01/02/2024 - 12:00:00: "Gordon<2><STEAM_0:1:1234><>" connected, address "10.1.2.3:27005""#)
            .unwrap();
        assert_eq!(m.kind, Some(RuleKind::Join));
        assert_eq!(m.name.as_deref(), Some("Gordon"));
        assert_eq!(m.id, Some(2));
        assert_eq!(m.ip.as_deref(), Some("10.1.2.3"));

        let m = g
            .match_line(r#"L 01/02/2024 - 12:01:00: "Gordon<2><STEAM_0:1:1234><Red>" say "hi all""#)
            .unwrap();
        assert_eq!(m.kind, Some(RuleKind::Chat));
        assert_eq!(m.message.as_deref(), Some("hi all"));
    }

    #[test]
    fn aceofspades_join_captures_ip() {
        let g = compiled("aceofspades");
        let m = g
            .match_line("2024-01-01 [piqueserver.player#info] Deuce (IP 10.0.0.9, ID 3) entered the game!")
            .unwrap();
        assert_eq!(m.name.as_deref(), Some("Deuce"));
        assert_eq!(m.ip.as_deref(), Some("10.0.0.9"));
        assert_eq!(m.id, Some(3));
    }

    #[test]
    fn doom3_join_beats_generic_chat() {
        let g = compiled("doom3");
        assert_eq!(
            kind_of(&g, "Server: Marine joined the game."),
            Some(RuleKind::Join)
        );
        assert_eq!(kind_of(&g, "Marine: hello"), Some(RuleKind::Chat));
    }

    #[test]
    fn minecraft_and_mumble() {
        let g = compiled("minecraft-beta");
        assert_eq!(
            kind_of(
                &g,
                "2011-01-01 12:00:00 [INFO] Notch [/127.0.0.1:5123] logged in with entity id 42 at (0.5, 64.0, 0.5)"
            ),
            Some(RuleKind::Join)
        );
        assert_eq!(
            kind_of(&g, "2011-01-01 12:00:00 [INFO] <Notch> hello"),
            Some(RuleKind::Chat)
        );

        let g = compiled("mumble");
        let m = g
            .match_line("<W>2024-01-01 12:00:00.000 1 => <5:Alice(-1)> Authenticated")
            .unwrap();
        assert_eq!(m.kind, Some(RuleKind::Join));
        assert_eq!(m.id, Some(5));
        assert_eq!(
            kind_of(&g, "<W>2024-01-01 12:05:00.000 1 => <5:Alice(-1)> Connection closed: reason"),
            Some(RuleKind::Leave)
        );
    }
}
