use std::path::PathBuf;

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli.rs"]
#[allow(dead_code)]
mod cli;

// Man pages land in $OUT_DIR/man: `worldsync.1`, `worldsync-watch.1`,
// `worldsync-config-show.1` and so on.
fn main() {
    println!("cargo::rerun-if-changed=src/cli.rs");

    let Some(out_dir) = std::env::var_os("OUT_DIR") else {
        panic!("OUT_DIR is not set");
    };
    let man_dir = PathBuf::from(out_dir).join("man");
    if let Err(e) = std::fs::create_dir_all(&man_dir) {
        panic!("cannot create {}: {e}", man_dir.display());
    }

    let mut pending = vec![cli::Cli::command()];
    while let Some(cmd) = pending.pop() {
        let page = man_dir.join(format!("{}.1", cmd.get_name()));
        let mut roff = Vec::new();
        if let Err(e) = Man::new(cmd.clone()).render(&mut roff) {
            panic!("cannot render {}: {e}", page.display());
        }
        if let Err(e) = std::fs::write(&page, roff) {
            panic!("cannot write {}: {e}", page.display());
        }
        pending.extend(visible_subcommands(&cmd));
    }
}

/// Subcommands renamed `<parent>-<child>` so each gets its own page.
fn visible_subcommands(parent: &Command) -> Vec<Command> {
    parent
        .get_subcommands()
        .filter(|sub| !sub.is_hide_set())
        .map(|sub| {
            let name = format!("{}-{}", parent.get_name(), sub.get_name());
            sub.clone().name(name)
        })
        .collect()
}
