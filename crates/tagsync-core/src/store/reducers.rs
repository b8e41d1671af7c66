//! Pure merge operations over state snapshots.
//!
//! One function per event/action kind. Each takes the current slice by
//! reference plus an event-specific payload and returns a new slice —
//! callers never observe in-place mutation, so old snapshots stay valid
//! for identity-based change detection.
//!
//! Every operation is idempotent and defensively no-ops on missing keys
//! instead of failing; all error handling lives at the transport
//! boundary, never here.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::state::{AppState, EnvState};
use crate::model::{
    ClientConnection, ClientDetails, ConnectionId, Entity, EntityId, EntityPatch, EnvId,
    EnvSummary, File, FileHash, FileRecord, Tag, TagId, TagSearchCondition, ThumbUpdate,
    ThumbnailState,
};

// ── Global slice ─────────────────────────────────────────────────────

pub fn set_client_details(state: &AppState, client: ClientDetails) -> AppState {
    AppState {
        client,
        ..state.clone()
    }
}

pub fn set_connection_list(state: &AppState, connections: Vec<ClientConnection>) -> AppState {
    let connection_map = connections
        .into_iter()
        .map(|conn| (conn.id.clone(), conn))
        .collect();
    AppState {
        connection_map,
        ..state.clone()
    }
}

pub fn add_connection(state: &AppState, connection: ClientConnection) -> AppState {
    let mut next = state.clone();
    next.connection_map.insert(connection.id.clone(), connection);
    next
}

pub fn remove_connection(state: &AppState, id: &ConnectionId) -> AppState {
    let mut next = state.clone();
    next.connection_map.remove(id);
    next
}

/// Replace the environment list.
///
/// Environments already open keep their files/entities/tags sub-state
/// with the summary swapped in; newly listed ones get fresh defaults;
/// environments absent from the new list are dropped with all their
/// sub-state.
pub fn set_summaries(state: &AppState, summaries: Vec<EnvSummary>) -> AppState {
    let env_ids: Vec<EnvId> = summaries.iter().map(|s| s.id.clone()).collect();
    let mut env_map = HashMap::with_capacity(summaries.len());
    for summary in summaries {
        let env = match state.env_map.get(&summary.id) {
            Some(existing) => {
                let mut env = (**existing).clone();
                env.summary = summary.clone();
                env
            }
            None => EnvState::new(summary.clone()),
        };
        env_map.insert(summary.id, Arc::new(env));
    }
    AppState {
        env_ids,
        env_map,
        ..state.clone()
    }
}

/// Replace one environment's summary, creating default sub-state when
/// the environment is new (backend-pushed environment creation).
pub fn update_summary(state: &AppState, summary: EnvSummary) -> AppState {
    let mut next = state.clone();
    if !next.env_ids.contains(&summary.id) {
        next.env_ids.push(summary.id.clone());
    }
    let env = match next.env_map.get(&summary.id) {
        Some(existing) => {
            let mut env = (**existing).clone();
            env.summary = summary.clone();
            env
        }
        None => EnvState::new(summary.clone()),
    };
    next.env_map.insert(summary.id, Arc::new(env));
    next
}

/// Drop an environment and all its sub-state. Idempotent.
pub fn close_environment(state: &AppState, id: &EnvId) -> AppState {
    let mut next = state.clone();
    next.env_ids.retain(|e| e != id);
    next.env_map.remove(id);
    next
}

pub fn mark_reconciled(state: &AppState, at: DateTime<Utc>) -> AppState {
    AppState {
        last_reconciled: Some(at),
        ..state.clone()
    }
}

// ── Environment slice: routing & search ──────────────────────────────

pub fn set_sub_route(env: &EnvState, sub_route: String) -> EnvState {
    EnvState {
        sub_route,
        ..env.clone()
    }
}

pub fn set_tag_selection(env: &EnvState, tag_id: TagId, selected: bool) -> EnvState {
    let mut next = env.clone();
    if selected {
        next.search.selected_tags.insert(tag_id);
    } else {
        next.search.selected_tags.remove(&tag_id);
    }
    next
}

pub fn set_tag_search_condition(env: &EnvState, condition: TagSearchCondition) -> EnvState {
    let mut next = env.clone();
    next.search.condition = condition;
    next
}

pub fn set_tag_filter(env: &EnvState, filter: String) -> EnvState {
    let mut next = env.clone();
    next.search.filter = filter;
    next
}

// ── Environment slice: tags ──────────────────────────────────────────

/// Full tag replacement from a bulk fetch.
pub fn set_all_tags(env: &EnvState, tags: Vec<Tag>) -> EnvState {
    let tag_ids = tags.iter().map(|t| t.id.clone()).collect();
    let tag_map = tags.into_iter().map(|t| (t.id.clone(), t)).collect();
    EnvState {
        tag_ids,
        tag_map,
        ..env.clone()
    }
}

/// Upsert tags by id. Tag records have no partial-update path, so each
/// incoming record replaces the stored one wholesale. New ids append to
/// the ordering in payload order; existing order is never disturbed.
pub fn add_or_update_tags(env: &EnvState, tags: Vec<Tag>) -> EnvState {
    let mut next = env.clone();
    for tag in tags {
        if !next.tag_ids.contains(&tag.id) {
            next.tag_ids.push(tag.id.clone());
        }
        next.tag_map.insert(tag.id.clone(), tag);
    }
    next
}

/// Remove a tag record and pull its id out of every entity's tag set.
pub fn remove_tag(env: &EnvState, tag_id: &TagId) -> EnvState {
    let mut next = env.clone();
    next.tag_ids.retain(|t| t != tag_id);
    next.tag_map.remove(tag_id);
    for entity in next.entity_map.values_mut() {
        entity.tag_ids.retain(|t| t != tag_id);
    }
    next
}

// ── Environment slice: entities ──────────────────────────────────────

pub fn set_all_entities(env: &EnvState, entities: Vec<Entity>) -> EnvState {
    let entity_map = entities.into_iter().map(|e| (e.id.clone(), e)).collect();
    EnvState {
        entity_map,
        ..env.clone()
    }
}

/// Shallow per-field upsert: fields absent from a partial record keep
/// their existing values. A patch for an unknown entity must carry a
/// hash to materialize it; otherwise it is skipped with a warning.
pub fn update_entities(env: &EnvState, patches: Vec<EntityPatch>) -> EnvState {
    let mut next = env.clone();
    for patch in patches {
        match next.entity_map.get_mut(&patch.id) {
            Some(entity) => {
                if let Some(hash) = patch.hash {
                    entity.hash = hash;
                }
                if let Some(is_dir) = patch.is_dir {
                    entity.is_dir = is_dir;
                }
                if let Some(tag_ids) = patch.tag_ids {
                    entity.tag_ids = tag_ids;
                }
            }
            None => match entity_from_patch(&patch) {
                Some(entity) => {
                    next.entity_map.insert(entity.id.clone(), entity);
                }
                None => {
                    warn!(entity_id = %patch.id, "entity patch without hash for unknown entity, skipping");
                }
            },
        }
    }
    next
}

/// Delete entities and clear the back-reference from any file that
/// points at them.
pub fn remove_entities(env: &EnvState, entity_ids: &[EntityId]) -> EnvState {
    let mut next = env.clone();
    for id in entity_ids {
        next.entity_map.remove(id);
    }
    for file in next.file_map.values_mut() {
        if let Some(ref eid) = file.entity_id {
            if entity_ids.contains(eid) {
                file.entity_id = None;
            }
        }
    }
    next
}

/// Union `tag_ids` into each named entity's tag set (creating the
/// entity when new) and point the matching file — matched by hash —
/// back at the entity.
pub fn tag_files(env: &EnvState, entities: Vec<EntityPatch>, tag_ids: &[TagId]) -> EnvState {
    let mut next = env.clone();
    for patch in entities {
        let resolved_hash = match next.entity_map.get_mut(&patch.id) {
            Some(entity) => {
                if let Some(hash) = patch.hash {
                    entity.hash = hash;
                }
                if let Some(is_dir) = patch.is_dir {
                    entity.is_dir = is_dir;
                }
                union_tags(&mut entity.tag_ids, tag_ids);
                entity.hash.clone()
            }
            None => {
                let Some(mut entity) = entity_from_patch(&patch) else {
                    warn!(entity_id = %patch.id, "tag event for unknown entity without hash, skipping");
                    continue;
                };
                union_tags(&mut entity.tag_ids, tag_ids);
                let hash = entity.hash.clone();
                next.entity_map.insert(entity.id.clone(), entity);
                hash
            }
        };

        if let Some(file) = next.file_map.get_mut(&resolved_hash) {
            file.entity_id = Some(patch.id.clone());
        }
    }
    next
}

/// Set-difference `tag_ids` out of each named entity's tag set. Unknown
/// entity ids are skipped with a warning; files are unaffected.
pub fn untag_files(env: &EnvState, entity_ids: &[EntityId], tag_ids: &[TagId]) -> EnvState {
    let mut next = env.clone();
    for id in entity_ids {
        let Some(entity) = next.entity_map.get_mut(id) else {
            warn!(entity_id = %id, "untag event for unknown entity, skipping");
            continue;
        };
        entity.tag_ids.retain(|t| !tag_ids.contains(t));
    }
    next
}

// ── Environment slice: files ─────────────────────────────────────────

/// Per-file upsert by hash.
///
/// Strips any riding `tag_ids` (membership lives on the Entity),
/// reconciles entity back-references when a file's `entity_id` changes,
/// and unions newly introduced files into their parent directory's
/// child-hash set — only for directories that already track children.
pub fn overwrite_files(env: &EnvState, files: &[FileRecord]) -> EnvState {
    let mut next = env.clone();
    let mut added_by_dir: HashMap<FileHash, Vec<FileHash>> = HashMap::new();

    for record in files {
        let old = next.file_map.get(&record.hash).cloned();
        let old_entity_id = old.as_ref().and_then(|f| f.entity_id.clone());

        // Entity back-reference reconciliation (invariant: a file's
        // entity_id always names a live entity with the same hash).
        if old.is_none() || record.entity_id != old_entity_id {
            if let Some(ref stale) = old_entity_id {
                next.entity_map.remove(stale);
            }
            if let Some(ref entity_id) = record.entity_id {
                let existing_tags = next
                    .entity_map
                    .get(entity_id)
                    .map(|e| e.tag_ids.clone());
                next.entity_map.insert(
                    entity_id.clone(),
                    Entity {
                        id: entity_id.clone(),
                        hash: record.hash.clone(),
                        is_dir: record.is_dir,
                        tag_ids: record
                            .tag_ids
                            .clone()
                            .or(existing_tags)
                            .unwrap_or_default(),
                    },
                );
            }
        }

        // Track which directories gained files.
        if old.is_none() {
            added_by_dir
                .entry(record.parent_dir_hash())
                .or_default()
                .push(record.hash.clone());
        }

        next.file_map
            .insert(record.hash.clone(), File::merged(old.as_ref(), record));
    }

    for (dir_hash, added) in added_by_dir {
        let Some(dir) = next.file_map.get_mut(&dir_hash) else {
            continue;
        };
        let Some(ref mut children) = dir.file_hashes else {
            continue;
        };
        for hash in added {
            if !children.contains(&hash) {
                children.push(hash);
            }
        }
    }

    next
}

/// Delete files by hash.
///
/// A file's owning entity goes with it (a tagging entity without a
/// backing file is meaningless), and parent directories' child-hash
/// sets shrink accordingly.
pub fn remove_files(env: &EnvState, hashes: &[FileHash]) -> EnvState {
    let mut next = env.clone();
    let mut removed_by_dir: HashMap<FileHash, Vec<FileHash>> = HashMap::new();

    for hash in hashes {
        let Some(file) = next.file_map.remove(hash) else {
            continue;
        };
        removed_by_dir
            .entry(file.parent_dir_hash())
            .or_default()
            .push(hash.clone());
        if let Some(ref entity_id) = file.entity_id {
            next.entity_map.remove(entity_id);
        }
    }

    for (dir_hash, removed) in removed_by_dir {
        let Some(dir) = next.file_map.get_mut(&dir_hash) else {
            continue;
        };
        let Some(ref mut children) = dir.file_hashes else {
            continue;
        };
        children.retain(|h| !removed.contains(h));
    }

    next
}

/// Authoritative child set for one directory after a full listing
/// fetch. Overrides whatever incremental tracking accumulated.
pub fn set_directory_children(
    env: &EnvState,
    directory: &FileRecord,
    child_hashes: Vec<FileHash>,
) -> EnvState {
    let mut next = env.clone();
    let old = next.file_map.get(&directory.hash).cloned();
    let mut dir = File::merged(old.as_ref(), directory);
    dir.file_hashes = Some(child_hashes);
    next.file_map.insert(directory.hash.clone(), dir);
    next
}

/// Per-hash thumbnail field update; unknown hashes are ignored.
pub fn update_thumbnail_states(
    env: &EnvState,
    thumbs: &[ThumbUpdate],
    state: ThumbnailState,
) -> EnvState {
    let mut next = env.clone();
    for thumb in thumbs {
        let Some(file) = next.file_map.get_mut(&thumb.hash) else {
            continue;
        };
        file.thumb_name = thumb.thumb_name.clone();
        file.thumb_state = Some(state);
    }
    next
}

// ── Helpers ──────────────────────────────────────────────────────────

fn entity_from_patch(patch: &EntityPatch) -> Option<Entity> {
    Some(Entity {
        id: patch.id.clone(),
        hash: patch.hash.clone()?,
        is_dir: patch.is_dir.unwrap_or(false),
        tag_ids: patch.tag_ids.clone().unwrap_or_default(),
    })
}

/// Append-set-union: appends ids not yet present, preserving existing
/// order.
fn union_tags(existing: &mut Vec<TagId>, incoming: &[TagId]) {
    for tag_id in incoming {
        if !existing.contains(tag_id) {
            existing.push(tag_id.clone());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn summary(id: &str) -> EnvSummary {
        EnvSummary {
            id: EnvId::from(id),
            path: format!("/collections/{id}"),
            slug: id.to_owned(),
            name: id.to_uppercase(),
            icon: "folder".into(),
            color: "#48f".into(),
        }
    }

    fn tag(id: &str, name: &str) -> Tag {
        Tag {
            id: TagId::from(id),
            name: name.to_owned(),
            color: "#f84".into(),
        }
    }

    fn entity(id: &str, hash: &FileHash, tags: &[&str]) -> Entity {
        Entity {
            id: EntityId::from(id),
            hash: hash.clone(),
            is_dir: false,
            tag_ids: tags.iter().map(|t| TagId::from(*t)).collect(),
        }
    }

    fn record(nix_path: &str) -> FileRecord {
        let base = nix_path.rsplit('/').next().unwrap_or("").to_owned();
        let name = base.rsplit_once('.').map_or(base.clone(), |(n, _)| n.to_owned());
        let ext = base.rsplit_once('.').map_or(String::new(), |(_, e)| e.to_owned());
        FileRecord {
            hash: FileHash::of_path(nix_path),
            nix_path: nix_path.to_owned(),
            base,
            ext,
            name,
            is_dir: false,
            entity_id: None,
            tag_ids: None,
            thumb_name: None,
            thumb_state: None,
            read_time: 1000,
            file_hashes: None,
        }
    }

    fn dir_record(nix_path: &str) -> FileRecord {
        let base = nix_path.rsplit('/').next().unwrap_or("").to_owned();
        FileRecord {
            hash: FileHash::of_path(nix_path),
            nix_path: nix_path.to_owned(),
            name: base.clone(),
            base,
            ext: String::new(),
            is_dir: true,
            entity_id: None,
            tag_ids: None,
            thumb_name: None,
            thumb_state: None,
            read_time: 1000,
            file_hashes: Some(Vec::new()),
        }
    }

    fn env() -> EnvState {
        EnvState::new(summary("env1"))
    }

    /// Invariant 1: every file back-reference names a live entity with
    /// the same hash. Invariant 2: every entity tag id names a live tag
    /// (only checked when the env actually has tags loaded).
    fn assert_invariants(env: &EnvState, check_tags: bool) {
        for file in env.file_map.values() {
            if let Some(ref entity_id) = file.entity_id {
                let entity = env
                    .entity_map
                    .get(entity_id)
                    .unwrap_or_else(|| panic!("dangling entity ref {entity_id}"));
                assert_eq!(entity.hash, file.hash, "entity hash mismatch");
            }
        }
        if check_tags {
            for entity in env.entity_map.values() {
                for tag_id in &entity.tag_ids {
                    assert!(env.tag_map.contains_key(tag_id), "dangling tag {tag_id}");
                }
            }
        }
    }

    // ── Global slice ─────────────────────────────────────────────────

    #[test]
    fn set_summaries_preserves_open_env_sub_state() {
        let state = AppState::default();
        let state = set_summaries(&state, vec![summary("env1")]);
        // Simulate loaded sub-state.
        let mut loaded = (**state.env(&EnvId::from("env1")).unwrap()).clone();
        loaded = set_all_tags(&loaded, vec![tag("t1", "red")]);
        let mut state2 = state.clone();
        state2
            .env_map
            .insert(EnvId::from("env1"), Arc::new(loaded));

        let mut refreshed_summary = summary("env1");
        refreshed_summary.name = "RENAMED".into();
        let next = set_summaries(&state2, vec![refreshed_summary, summary("env2")]);

        assert_eq!(next.env_ids.len(), 2);
        let env1 = next.env(&EnvId::from("env1")).unwrap();
        assert_eq!(env1.summary.name, "RENAMED");
        assert_eq!(env1.tag_ids.len(), 1, "sub-state preserved");
        let env2 = next.env(&EnvId::from("env2")).unwrap();
        assert!(env2.tag_map.is_empty());
        assert_eq!(env2.sub_route, "/browse");
    }

    #[test]
    fn set_summaries_drops_unlisted_envs() {
        let state = set_summaries(&AppState::default(), vec![summary("env1"), summary("env2")]);
        let next = set_summaries(&state, vec![summary("env2")]);
        assert!(next.env(&EnvId::from("env1")).is_none());
        assert_eq!(next.env_ids, vec![EnvId::from("env2")]);
    }

    #[test]
    fn close_environment_is_idempotent() {
        let state = set_summaries(&AppState::default(), vec![summary("env1")]);
        let once = close_environment(&state, &EnvId::from("env1"));
        let twice = close_environment(&once, &EnvId::from("env1"));
        assert_eq!(once, twice);
        assert!(once.env_map.is_empty());
    }

    #[test]
    fn connection_lifecycle() {
        let conn = ClientConnection {
            id: ConnectionId::from("c1"),
            ip: "10.0.0.9".into(),
            local_client: false,
            user_agent: "Firefox".into(),
        };
        let state = add_connection(&AppState::default(), conn.clone());
        assert_eq!(state.connection_map.len(), 1);
        // Duplicate add is a no-op.
        assert_eq!(add_connection(&state, conn), state);
        let gone = remove_connection(&state, &ConnectionId::from("c1"));
        assert!(gone.connection_map.is_empty());
        assert_eq!(remove_connection(&gone, &ConnectionId::from("c1")), gone);
    }

    // ── Tags ─────────────────────────────────────────────────────────

    #[test]
    fn set_all_tags_replaces_wholesale() {
        let env = set_all_tags(&env(), vec![tag("t1", "red"), tag("t2", "blue")]);
        let next = set_all_tags(&env, vec![tag("t3", "green")]);
        assert_eq!(next.tag_ids, vec![TagId::from("t3")]);
        assert_eq!(next.tag_map.len(), 1);
    }

    #[test]
    fn add_or_update_tags_appends_new_and_replaces_existing() {
        let env = set_all_tags(&env(), vec![tag("t1", "red")]);
        let next = add_or_update_tags(&env, vec![tag("t1", "crimson"), tag("t2", "blue")]);
        assert_eq!(next.tag_ids, vec![TagId::from("t1"), TagId::from("t2")]);
        assert_eq!(next.tag_map[&TagId::from("t1")].name, "crimson");

        // Idempotent.
        let again = add_or_update_tags(&next, vec![tag("t1", "crimson"), tag("t2", "blue")]);
        assert_eq!(next, again);
    }

    #[test]
    fn remove_tag_clears_entity_membership() {
        let hash = FileHash::of_path("/a.txt");
        let mut env = set_all_tags(&env(), vec![tag("t1", "red"), tag("t2", "blue")]);
        env = set_all_entities(&env, vec![entity("e1", &hash, &["t1", "t2"])]);

        let next = remove_tag(&env, &TagId::from("t1"));
        assert!(!next.tag_map.contains_key(&TagId::from("t1")));
        assert_eq!(
            next.entity_map[&EntityId::from("e1")].tag_ids,
            vec![TagId::from("t2")]
        );
        assert_invariants(&next, true);
        assert_eq!(remove_tag(&next, &TagId::from("t1")), next);
    }

    // ── Entities ─────────────────────────────────────────────────────

    #[test]
    fn update_entities_preserves_absent_fields() {
        let hash = FileHash::of_path("/a.txt");
        let env = set_all_entities(&env(), vec![entity("e1", &hash, &["t1"])]);

        let patch = EntityPatch {
            id: EntityId::from("e1"),
            hash: None,
            is_dir: Some(true),
            tag_ids: None,
        };
        let next = update_entities(&env, vec![patch.clone()]);
        let e1 = &next.entity_map[&EntityId::from("e1")];
        assert!(e1.is_dir);
        assert_eq!(e1.hash, hash, "hash preserved");
        assert_eq!(e1.tag_ids, vec![TagId::from("t1")], "tags preserved");

        assert_eq!(update_entities(&next, vec![patch]), next);
    }

    #[test]
    fn update_entities_materializes_new_entity_with_hash() {
        let hash = FileHash::of_path("/b.txt");
        let patch = EntityPatch {
            id: EntityId::from("e2"),
            hash: Some(hash.clone()),
            is_dir: None,
            tag_ids: Some(vec![TagId::from("t9")]),
        };
        let next = update_entities(&env(), vec![patch]);
        assert_eq!(next.entity_map[&EntityId::from("e2")].hash, hash);
    }

    #[test]
    fn update_entities_skips_unknown_entity_without_hash() {
        let patch = EntityPatch {
            id: EntityId::from("ghost"),
            hash: None,
            is_dir: None,
            tag_ids: None,
        };
        let next = update_entities(&env(), vec![patch]);
        assert!(next.entity_map.is_empty());
    }

    #[test]
    fn remove_entities_clears_file_back_references() {
        let rec = record("/a.txt");
        let mut with_entity = rec.clone();
        with_entity.entity_id = Some(EntityId::from("e1"));
        let env = overwrite_files(&env(), &[with_entity]);
        assert!(env.entity_map.contains_key(&EntityId::from("e1")));

        let next = remove_entities(&env, &[EntityId::from("e1")]);
        assert!(next.entity_map.is_empty());
        assert_eq!(next.file_map[&rec.hash].entity_id, None);
        assert_invariants(&next, false);
        assert_eq!(remove_entities(&next, &[EntityId::from("e1")]), next);
    }

    // ── Tag / untag scenario ─────────────────────────────────────────

    #[test]
    fn tag_then_untag_round_trip() {
        let rec = record("/a.txt");
        let env = overwrite_files(&env(), &[rec.clone()]);

        let patch = EntityPatch {
            id: EntityId::from("e1"),
            hash: Some(rec.hash.clone()),
            is_dir: None,
            tag_ids: None,
        };
        let tagged = tag_files(&env, vec![patch.clone()], &[TagId::from("t1")]);
        let e1 = &tagged.entity_map[&EntityId::from("e1")];
        assert_eq!(e1.tag_ids, vec![TagId::from("t1")]);
        assert_eq!(
            tagged.file_map[&rec.hash].entity_id,
            Some(EntityId::from("e1"))
        );
        assert_invariants(&tagged, false);

        // Idempotent.
        let tagged_twice = tag_files(&tagged, vec![patch], &[TagId::from("t1")]);
        assert_eq!(tagged, tagged_twice);

        let untagged = untag_files(&tagged, &[EntityId::from("e1")], &[TagId::from("t1")]);
        assert!(untagged.entity_map[&EntityId::from("e1")].tag_ids.is_empty());
        // File back-reference unaffected by untag.
        assert_eq!(
            untagged.file_map[&rec.hash].entity_id,
            Some(EntityId::from("e1"))
        );
        assert_eq!(
            untag_files(&untagged, &[EntityId::from("e1")], &[TagId::from("t1")]),
            untagged
        );
    }

    #[test]
    fn untag_unknown_entity_skips_but_processes_rest() {
        let hash = FileHash::of_path("/a.txt");
        let env = set_all_entities(&env(), vec![entity("e1", &hash, &["t1", "t2"])]);
        let next = untag_files(
            &env,
            &[EntityId::from("ghost"), EntityId::from("e1")],
            &[TagId::from("t1")],
        );
        assert_eq!(
            next.entity_map[&EntityId::from("e1")].tag_ids,
            vec![TagId::from("t2")]
        );
    }

    #[test]
    fn tag_union_preserves_append_order() {
        let hash = FileHash::of_path("/a.txt");
        let env = set_all_entities(&env(), vec![entity("e1", &hash, &["t2"])]);
        let patch = EntityPatch {
            id: EntityId::from("e1"),
            hash: None,
            is_dir: None,
            tag_ids: None,
        };
        let next = tag_files(&env, vec![patch], &[TagId::from("t1"), TagId::from("t2")]);
        assert_eq!(
            next.entity_map[&EntityId::from("e1")].tag_ids,
            vec![TagId::from("t2"), TagId::from("t1")]
        );
    }

    // ── Files ────────────────────────────────────────────────────────

    #[test]
    fn overwrite_files_strips_tag_ids_and_creates_entity() {
        let mut rec = record("/a.txt");
        rec.entity_id = Some(EntityId::from("e1"));
        rec.tag_ids = Some(vec![TagId::from("t1")]);

        let next = overwrite_files(&env(), &[rec.clone()]);
        let file = &next.file_map[&rec.hash];
        assert_eq!(file.entity_id, Some(EntityId::from("e1")));
        let e1 = &next.entity_map[&EntityId::from("e1")];
        assert_eq!(e1.hash, rec.hash);
        assert_eq!(e1.tag_ids, vec![TagId::from("t1")]);
        assert_invariants(&next, false);

        assert_eq!(overwrite_files(&next, &[rec]), next);
    }

    #[test]
    fn overwrite_files_reconciles_moved_back_reference() {
        let mut rec = record("/a.txt");
        rec.entity_id = Some(EntityId::from("e1"));
        let env = overwrite_files(&env(), &[rec.clone()]);

        // Backend re-keys the entity for this file.
        rec.entity_id = Some(EntityId::from("e2"));
        let next = overwrite_files(&env, &[rec.clone()]);
        assert!(!next.entity_map.contains_key(&EntityId::from("e1")));
        assert_eq!(
            next.file_map[&rec.hash].entity_id,
            Some(EntityId::from("e2"))
        );
        assert_invariants(&next, false);
    }

    #[test]
    fn overwrite_files_tracks_new_children_incrementally() {
        let dir = dir_record("/docs");
        let env = overwrite_files(&env(), &[dir.clone()]);

        let a = record("/docs/a.txt");
        let b = record("/docs/b.txt");
        let next = overwrite_files(&env, &[a.clone(), b.clone()]);
        let children = next.file_map[&dir.hash].file_hashes.clone().unwrap();
        assert_eq!(children, vec![a.hash.clone(), b.hash.clone()]);

        // Same event again: no duplicates (idempotence + invariant 3).
        let again = overwrite_files(&next, &[a.clone(), b.clone()]);
        assert_eq!(next, again);
    }

    #[test]
    fn overwrite_files_ignores_untracked_directories() {
        // Directory exists but has never had its contents fetched.
        let mut dir = dir_record("/docs");
        dir.file_hashes = None;
        let env = overwrite_files(&env(), &[dir.clone()]);

        let next = overwrite_files(&env, &[record("/docs/a.txt")]);
        assert_eq!(next.file_map[&dir.hash].file_hashes, None);
    }

    #[test]
    fn remove_files_cascades_to_entity_and_parent() {
        let dir = dir_record("/dir");
        let mut rec = record("/dir/f.txt");
        rec.entity_id = Some(EntityId::from("e2"));
        let env = overwrite_files(&env(), &[dir.clone(), rec.clone()]);
        assert_eq!(
            env.file_map[&dir.hash].file_hashes.clone().unwrap(),
            vec![rec.hash.clone()]
        );

        let next = remove_files(&env, &[rec.hash.clone()]);
        assert!(!next.file_map.contains_key(&rec.hash));
        assert!(!next.entity_map.contains_key(&EntityId::from("e2")));
        assert_eq!(
            next.file_map[&dir.hash].file_hashes.clone().unwrap(),
            Vec::<FileHash>::new()
        );
        assert_invariants(&next, false);

        assert_eq!(remove_files(&next, &[rec.hash.clone()]), next);
    }

    #[test]
    fn directory_membership_tracks_adds_and_removes_exactly() {
        let dir = dir_record("/a");
        let mut env = overwrite_files(&env(), &[dir.clone()]);

        let files: Vec<FileRecord> = (0..4)
            .map(|i| record(&format!("/a/f{i}.txt")))
            .collect();
        env = overwrite_files(&env, &files);
        env = remove_files(&env, &[files[1].hash.clone(), files[3].hash.clone()]);

        let expected: Vec<FileHash> = vec![files[0].hash.clone(), files[2].hash.clone()];
        assert_eq!(env.file_map[&dir.hash].file_hashes.clone().unwrap(), expected);

        // The set matches exactly the current children in the file map.
        let actual_children: Vec<&FileHash> = env
            .file_map
            .values()
            .filter(|f| !f.is_dir)
            .map(|f| &f.hash)
            .collect();
        assert_eq!(actual_children.len(), expected.len());
    }

    #[test]
    fn set_directory_children_is_authoritative() {
        let dir = dir_record("/docs");
        let a = record("/docs/a.txt");
        let stale = FileHash::of_path("/docs/gone.txt");

        let mut env = overwrite_files(&env(), &[dir.clone(), a.clone()]);
        // Pretend incremental tracking picked up a stale child.
        let mut dirty = env.file_map[&dir.hash].clone();
        dirty.file_hashes = Some(vec![a.hash.clone(), stale]);
        env.file_map.insert(dir.hash.clone(), dirty);

        let next = set_directory_children(&env, &dir, vec![a.hash.clone()]);
        assert_eq!(
            next.file_map[&dir.hash].file_hashes.clone().unwrap(),
            vec![a.hash.clone()]
        );
        assert_eq!(
            set_directory_children(&next, &dir, vec![a.hash.clone()]),
            next
        );
    }

    #[test]
    fn thumbnail_updates_ignore_unknown_hashes() {
        let rec = record("/a.jpg");
        let env = overwrite_files(&env(), &[rec.clone()]);

        let thumbs = vec![
            ThumbUpdate {
                hash: rec.hash.clone(),
                thumb_name: Some("a-thumb.jpg".into()),
            },
            ThumbUpdate {
                hash: FileHash::of_path("/ghost.jpg"),
                thumb_name: None,
            },
        ];
        let next = update_thumbnail_states(&env, &thumbs, ThumbnailState::Ready);
        let file = &next.file_map[&rec.hash];
        assert_eq!(file.thumb_name.as_deref(), Some("a-thumb.jpg"));
        assert_eq!(file.thumb_state, Some(ThumbnailState::Ready));
        assert_eq!(next.file_map.len(), 1);

        assert_eq!(
            update_thumbnail_states(&next, &thumbs, ThumbnailState::Ready),
            next
        );
    }

    // ── Search & routing ─────────────────────────────────────────────

    #[test]
    fn search_state_transitions() {
        let env = env();
        let next = set_tag_selection(&env, TagId::from("t1"), true);
        assert!(next.search.selected_tags.contains(&TagId::from("t1")));
        let next = set_tag_selection(&next, TagId::from("t1"), false);
        assert!(next.search.selected_tags.is_empty());

        let next = set_tag_search_condition(&next, TagSearchCondition::Any);
        assert_eq!(next.search.condition, TagSearchCondition::Any);

        let next = set_tag_filter(&next, "vaca".into());
        assert_eq!(next.search.filter, "vaca");

        let next = set_sub_route(&next, "/search".into());
        assert_eq!(next.sub_route, "/search");
    }

    // ── Snapshot identity ────────────────────────────────────────────

    #[test]
    fn old_snapshots_remain_valid_after_merge() {
        let before = set_all_tags(&env(), vec![tag("t1", "red")]);
        let after = add_or_update_tags(&before, vec![tag("t2", "blue")]);
        assert_eq!(before.tag_ids.len(), 1, "old snapshot untouched");
        assert_eq!(after.tag_ids.len(), 2);
    }
}
