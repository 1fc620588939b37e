use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use lsnp_core::message::new_message_id;
use lsnp_core::{Token, UserId};
use lsnp_dispatcher::Coordinator;

/// A command handler: given the coordinator and the text following the
/// command word, performs the action and prints its own result.
pub type Handler = for<'a> fn(&'a Arc<Coordinator>, &'a str) -> BoxFuture<'a, ()>;

/// Builds the dispatch table mapping a command word to its handler, the
/// same shape as the original's `app.commands` dict assembled at the end
/// of `register_cli`.
pub fn command_table() -> HashMap<&'static str, Handler> {
    let mut table: HashMap<&'static str, Handler> = HashMap::new();
    table.insert("peers", |c, a| cmd_peers(c, a).boxed());
    table.insert("post", |c, a| cmd_post(c, a).boxed());
    table.insert("dm", |c, a| cmd_dm(c, a).boxed());
    table.insert("follow", |c, a| cmd_follow(c, a, true).boxed());
    table.insert("unfollow", |c, a| cmd_follow(c, a, false).boxed());
    table.insert("like", |c, a| cmd_like(c, a).boxed());
    table.insert("group_create", |c, a| cmd_group_create(c, a).boxed());
    table.insert("group_update", |c, a| cmd_group_update(c, a).boxed());
    table.insert("group_msg", |c, a| cmd_group_msg(c, a).boxed());
    table.insert("file_send", |c, a| cmd_file_send(c, a).boxed());
    table.insert("accept", |c, a| cmd_accept(c, a).boxed());
    table.insert("ignore", |c, a| cmd_ignore(c, a).boxed());
    table.insert("revoke", |c, a| cmd_revoke(c, a).boxed());
    table.insert("ttt_invite", |c, a| cmd_ttt_invite(c, a).boxed());
    table.insert("ttt_move", |c, a| cmd_ttt_move(c, a).boxed());
    table
}

async fn cmd_peers(coord: &Arc<Coordinator>, _args: &str) {
    let mut peers = coord.peers.list();
    if peers.is_empty() {
        coord.display.line("No peers discovered yet.".to_string());
        return;
    }
    peers.sort_by(|a, b| a.1.display_name.to_lowercase().cmp(&b.1.display_name.to_lowercase()));

    coord.display.line(String::new());
    coord.display.line("Known Peers".to_string());
    for (uid, rec) in peers {
        coord.display.line(format!(
            "{:<20} {:<28} {:<22} {}",
            rec.display_name, uid.as_str(), rec.endpoint.to_string(), rec.status
        ));
    }
}

async fn cmd_post(coord: &Arc<Coordinator>, args: &str) {
    let content = args.trim();
    if content.is_empty() {
        coord.display.line("Usage: post <message>".to_string());
        return;
    }
    coord.social.post(content, coord.default_ttl).await;
    coord.display.line("Post sent.".to_string());
}

async fn cmd_dm(coord: &Arc<Coordinator>, args: &str) {
    let Some((to, content)) = args.split_once(' ') else {
        coord.display.line("Usage: dm <user_id> <message>".to_string());
        return;
    };
    let to = UserId::from(to);
    if coord.peers.endpoint_of(&to).is_none() {
        coord.display.line(
            "Don't know where to send that yet. Try 'peers' and wait for PROFILEs.".to_string(),
        );
        return;
    }
    coord.social.dm(&to, content, coord.default_ttl).await;
    coord.display.line(format!("DM sent to {}.", to.as_str()));
}

async fn cmd_follow(coord: &Arc<Coordinator>, args: &str, follow: bool) {
    let to = args.trim();
    if to.is_empty() {
        let verb = if follow { "follow" } else { "unfollow" };
        coord.display.line(format!("Usage: {verb} <user_id>"));
        return;
    }
    let to = UserId::from(to);
    if coord.peers.endpoint_of(&to).is_none() {
        coord.display.line(
            "Don't know where to send that yet. Try 'peers' and wait for PROFILEs.".to_string(),
        );
        return;
    }
    if follow && coord.social.is_following(&to) {
        coord.display.line(format!("You're already following {}.", to.as_str()));
        return;
    }
    if !follow && !coord.social.is_following(&to) {
        coord.display.line(format!("You're not following {}.", to.as_str()));
        return;
    }
    if follow {
        coord.social.follow(&to, coord.default_ttl).await;
        coord.display.line(format!("Follow sent to {}.", to.as_str()));
    } else {
        coord.social.unfollow(&to, coord.default_ttl).await;
        coord.display.line(format!("Unfollow sent to {}.", to.as_str()));
    }
}

async fn cmd_like(coord: &Arc<Coordinator>, args: &str) {
    let mut parts = args.splitn(3, ' ');
    let (Some(to), Some(post_ts)) = (parts.next(), parts.next()) else {
        coord.display.line("Usage: like <user_id> <post_timestamp> [UNLIKE]".to_string());
        return;
    };
    let unlike = parts.next().map(|a| a.eq_ignore_ascii_case("UNLIKE")).unwrap_or(false);
    let to = UserId::from(to);
    if coord.peers.endpoint_of(&to).is_none() {
        coord.display.line(
            "Don't know where to send that yet. Try 'peers' and wait for PROFILEs.".to_string(),
        );
        return;
    }
    coord.social.like(&to, post_ts, unlike, coord.default_ttl).await;
    let verb = if unlike { "UNLIKE" } else { "LIKE" };
    coord.display.line(format!("{verb} sent to {} for post {post_ts}.", to.as_str()));
}

fn parse_user_list(csv: &str) -> Vec<UserId> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(UserId::from)
        .collect()
}

async fn cmd_group_create(coord: &Arc<Coordinator>, args: &str) {
    let Some((group_id, rest)) = args.split_once(' ') else {
        coord.display.line(r#"Usage: group_create <group_id> "<group name>" member1,member2"#.to_string());
        return;
    };
    let rest = rest.trim();
    let Some((name, after)) = parse_quoted_name(rest) else {
        coord.display.line(r#"Usage: group_create <group_id> "<group name>" member1,member2"#.to_string());
        return;
    };
    let members = parse_user_list(after);
    coord
        .social
        .group_create(group_id, name, members, coord.default_ttl)
        .await;
    coord.display.line(String::new());
    coord.display.line("GROUP - CREATE".to_string());
    coord.display.line(format!("ID: {group_id}"));
    coord.display.line(format!("Name: {name}"));
    coord.display.line("Result: created locally and notified members.".to_string());
}

/// Parses `"<name>" rest` into `(name, rest)`, or `(group_id, rest)` if the
/// leading token isn't quoted — matching the original's loose parsing.
fn parse_quoted_name(rest: &str) -> Option<(&str, &str)> {
    if let Some(stripped) = rest.strip_prefix('"') {
        let end = stripped.find('"')?;
        let name = &stripped[..end];
        let after = stripped[end + 1..].trim_start_matches(',').trim();
        Some((name, after))
    } else {
        rest.split_once(' ')
    }
}

async fn cmd_group_update(coord: &Arc<Coordinator>, args: &str) {
    let mut parts = args.split_whitespace();
    let Some(group_id) = parts.next() else {
        coord.display.line("Usage: group_update <group_id> add=a,b remove=c".to_string());
        return;
    };
    let mut add = Vec::new();
    let mut remove = Vec::new();
    for p in parts {
        if let Some(v) = p.strip_prefix("add=") {
            add = parse_user_list(v);
        } else if let Some(v) = p.strip_prefix("remove=") {
            remove = parse_user_list(v);
        }
    }
    coord.social.group_update(group_id, add, remove, coord.default_ttl).await;
    let name = coord.social.groups().name_of(group_id).unwrap_or_default();
    coord.display.line(format!("Group \"{name}\" member list updated."));
}

async fn cmd_group_msg(coord: &Arc<Coordinator>, args: &str) {
    let Some((group_id, content)) = args.split_once(' ') else {
        coord.display.line("Usage: group_msg <group_id> <message>".to_string());
        return;
    };
    if coord.social.groups().members(group_id).is_empty() {
        coord.display.line(format!("No known members for group \"{group_id}\"."));
        return;
    }
    coord.social.group_message(group_id, content, coord.default_ttl).await;
}

async fn cmd_file_send(coord: &Arc<Coordinator>, args: &str) {
    let Some((to, path)) = args.split_once(' ') else {
        coord.display.line("Usage: file_send <user_id> <path>".to_string());
        return;
    };
    let path = path.trim().trim_matches('"').trim_matches('\'');
    let mut resolved = Path::new(path).to_path_buf();
    if !resolved.is_file() {
        let fallback = Path::new("client-files").join(
            Path::new(path).file_name().unwrap_or_default(),
        );
        if fallback.is_file() {
            resolved = fallback;
        } else {
            coord.display.line(format!("File not found: {path}"));
            return;
        }
    }
    let data = match std::fs::read(&resolved) {
        Ok(d) => d,
        Err(e) => {
            coord.display.line(format!("File not found: {path} ({e})"));
            return;
        }
    };
    let to = UserId::from(to);
    let filename = resolved.file_name().and_then(|s| s.to_str()).unwrap_or("file").to_string();
    coord.files.send_file(&to, &filename, &data, coord.default_ttl).await;
}

async fn cmd_accept(coord: &Arc<Coordinator>, args: &str) {
    let fileid = args.trim();
    if fileid.is_empty() {
        coord.display.line("Usage: accept <FILEID>".to_string());
        return;
    }
    coord.files.accept(fileid);
}

async fn cmd_ignore(coord: &Arc<Coordinator>, args: &str) {
    let fileid = args.trim();
    if fileid.is_empty() {
        coord.display.line("Usage: ignore <FILEID>".to_string());
        return;
    }
    coord.files.ignore(fileid);
}

async fn cmd_revoke(coord: &Arc<Coordinator>, args: &str) {
    let token = args.trim();
    if token.is_empty() {
        coord.display.line("Usage: revoke <token>".to_string());
        return;
    }
    coord.revoked.revoke(&Token::from(token));
    coord.display.line("Token revoked.".to_string());
}

async fn cmd_ttt_invite(coord: &Arc<Coordinator>, args: &str) {
    let mut parts = args.split_whitespace();
    let Some(to) = parts.next() else {
        coord.display.line("Usage: ttt_invite <user_id> [X|O] [gameid]".to_string());
        return;
    };
    let symbol = parts
        .next()
        .and_then(|s| s.chars().next())
        .map(|c| c.to_ascii_uppercase())
        .unwrap_or('X');
    let gameid = parts
        .next()
        .map(str::to_string)
        .unwrap_or_else(|| format!("g{}", &new_message_id()[..2]));
    coord
        .game
        .invite(&UserId::from(to), &gameid, symbol, coord.default_ttl)
        .await;
}

async fn cmd_ttt_move(coord: &Arc<Coordinator>, args: &str) {
    let parts: Vec<&str> = args.split_whitespace().collect();
    if parts.len() < 5 {
        coord.display.line("Usage: ttt_move <user_id> <gameid> <pos> <turn> <symbol>".to_string());
        return;
    }
    let (to, gid, pos, turn, sym) = (parts[0], parts[1], parts[2], parts[3], parts[4]);
    let (Ok(pos), Ok(turn)) = (pos.parse::<usize>(), turn.parse::<u64>()) else {
        coord.display.line("pos and turn must be integers.".to_string());
        return;
    };
    let symbol = sym.chars().next().unwrap_or('X').to_ascii_uppercase();
    coord
        .game
        .make_move(&UserId::from(to), gid, pos, symbol, turn, coord.default_ttl)
        .await;
}
