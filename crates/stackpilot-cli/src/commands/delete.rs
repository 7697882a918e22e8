use super::{drive, CommandError, Session};
use stackpilot_schema::StackId;

pub fn run(session: &Session, stack_id: &str, json: bool) -> Result<u8, CommandError> {
    let stack_id = StackId::new(stack_id);
    let coordinator = session.coordinator();
    drive(
        &format!("deleting stack {stack_id}"),
        &format!("stack {stack_id} deleted"),
        json,
        || coordinator.delete(&stack_id),
    )
}
