// SPDX-License-Identifier: MPL-2.0

//! Config file watching.
//!
//! The parent directory is watched instead of the file itself, so a file
//! replaced by an editor's rename is still noticed.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use calloop::{LoopHandle, channel};
use notify::{
    EventKind, RecommendedWatcher, RecursiveMode, Watcher,
    event::{ModifyKind, RenameMode},
};
use tracing::debug;

/// Whether `event` changed the contents behind `file_name`.
#[must_use]
pub fn touches(event: &notify::Event, file_name: &OsString) -> bool {
    let relevant_kind = matches!(
        event.kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Both))
    );

    relevant_kind
        && event
            .paths
            .iter()
            .any(|path| path.file_name() == Some(file_name.as_os_str()))
}

/// Watch `path` and forward events touching it to `tx`.
///
/// The watcher stops when the returned value is dropped.
///
/// # Errors
///
/// Fails if the platform watcher cannot be created or the directory cannot
/// be watched.
pub fn watch_file(
    path: &Path,
    tx: channel::SyncSender<notify::Event>,
) -> notify::Result<RecommendedWatcher> {
    let file_name = path
        .file_name()
        .map(OsString::from)
        .ok_or_else(|| notify::Error::generic("watched path has no file name"))?;
    let dir = path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                if touches(&event, &file_name) {
                    let _ = tx.send(event);
                }
            }
        },
        notify::Config::default(),
    )?;

    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    debug!(path = %path.display(), "watching config file");
    Ok(watcher)
}

/// Insert a channel into the loop that calls `on_change` for every event
/// sent on the returned sender.
///
/// # Errors
///
/// Fails if the event loop refuses the source.
pub fn change_source<D: 'static>(
    handle: &LoopHandle<'static, D>,
    on_change: fn(&mut D, &notify::Event),
) -> Result<channel::SyncSender<notify::Event>, calloop::Error> {
    let (tx, rx) = channel::sync_channel(20);
    handle
        .insert_source(rx, move |event, _, state: &mut D| match event {
            channel::Event::Msg(event) => on_change(state, &event),
            channel::Event::Closed => debug!("config watcher closed"),
        })
        .map_err(|why| why.error)?;
    Ok(tx)
}
