use super::{drive, CommandError, Session};
use stackpilot_schema::parse_definition_file;
use std::path::Path;

pub fn run(session: &Session, definition: &Path, json: bool) -> Result<u8, CommandError> {
    let definition = parse_definition_file(definition)?;
    let coordinator = session.coordinator();
    drive(
        &format!("creating stack {}", definition.name),
        &format!("stack {} created", definition.name),
        json,
        || coordinator.create(&definition),
    )
}
