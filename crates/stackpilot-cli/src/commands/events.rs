use super::{json_pretty, CommandError, Session, EXIT_SUCCESS};
use stackpilot_core::EventPages;
use stackpilot_schema::{StackEvent, StackId};

pub fn run(
    session: &Session,
    stack_id: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<u8, CommandError> {
    let stack_id = StackId::new(stack_id);
    let events = collect(session, &stack_id, limit)?;

    if json {
        println!("{}", json_pretty(&events)?);
        return Ok(EXIT_SUCCESS);
    }

    if events.is_empty() {
        println!("no events recorded for {stack_id}");
    }
    for event in &events {
        println!(
            "{}  {:<44} {:<32} {}",
            event.timestamp.format("%Y-%m-%d %H:%M:%S"),
            event.resource_status.as_str(),
            event.logical_resource_id.as_deref().unwrap_or(&event.resource_type),
            event.reason().unwrap_or("")
        );
    }
    Ok(EXIT_SUCCESS)
}

fn collect(
    session: &Session,
    stack_id: &StackId,
    limit: Option<usize>,
) -> Result<Vec<StackEvent>, CommandError> {
    let limit = limit.unwrap_or(usize::MAX);
    let mut events = Vec::new();
    for page in EventPages::new(session.plane(), stack_id) {
        for event in page? {
            if events.len() >= limit {
                return Ok(events);
            }
            events.push(event);
        }
    }
    Ok(events)
}
