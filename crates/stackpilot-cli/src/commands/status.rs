use super::{colorize_status, json_pretty, CommandError, Session, EXIT_SUCCESS};
use stackpilot_schema::StackId;

pub fn run(session: &Session, stack_id: &str, json: bool) -> Result<u8, CommandError> {
    let stack_id = StackId::new(stack_id);
    let Some(stack) = session.coordinator().read(&stack_id)? else {
        return Err(CommandError::failure(format!(
            "stack {stack_id} does not exist"
        )));
    };

    if json {
        println!("{}", json_pretty(&stack)?);
    } else {
        println!("stack_id:    {}", stack.stack_id);
        println!("name:        {}", stack.stack_name);
        println!("status:      {}", colorize_status(stack.stack_status));
        if let Some(ref reason) = stack.stack_status_reason {
            println!("reason:      {reason}");
        }
        if let Some(at) = stack.last_event_at {
            println!("last_event:  {}", at.to_rfc3339());
        }
        for (key, value) in &stack.outputs {
            println!("output:      {key} = {value}");
        }
    }
    Ok(EXIT_SUCCESS)
}
