// src/cli/parse.rs — Try the page-position parser on a footer

use crate::capture::page::parse_position;

pub fn run_parse(text: &str) -> anyhow::Result<()> {
    match parse_position(text) {
        Some(pos) => println!("page {} of {}", pos.current, pos.total),
        None => println!("not a page marker"),
    }
    Ok(())
}
