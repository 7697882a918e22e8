use super::{drive, CommandError, Session};
use stackpilot_schema::{parse_definition_file, StackId};
use std::path::Path;

pub fn run(
    session: &Session,
    stack_id: &str,
    definition: &Path,
    json: bool,
) -> Result<u8, CommandError> {
    let definition = parse_definition_file(definition)?;
    let stack_id = StackId::new(stack_id);
    let coordinator = session.coordinator();
    drive(
        &format!("updating stack {stack_id}"),
        &format!("stack {stack_id} updated"),
        json,
        || coordinator.update(&stack_id, &definition),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{EXIT_REMOTE_ERROR, EXIT_SUCCESS};
    use stackpilot_core::CancelToken;
    use stackpilot_remote::{MockControlPlane, MockFailure};
    use stackpilot_schema::StackStatus;

    fn definition_file(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("stack.toml");
        std::fs::write(
            &path,
            "name = \"web\"\ntemplate_url = \"https://example.com/web.json\"\n",
        )
        .unwrap();
        path
    }

    #[test]
    fn no_op_update_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let plane = MockControlPlane::new("s-1")
            .with_statuses(&[StackStatus::UpdateComplete])
            .failing_update(MockFailure::NoChanges);
        let session = Session::new(Box::new(plane), CancelToken::new(), None);
        let code = run(&session, "s-1", &definition_file(dir.path()), true).unwrap();
        assert_eq!(code, EXIT_SUCCESS);
    }

    #[test]
    fn rejected_update_is_a_remote_error() {
        let dir = tempfile::tempdir().unwrap();
        let plane = MockControlPlane::new("s-1").failing_update(MockFailure::Api {
            code: "ValidationError".to_owned(),
            message: "Template format error".to_owned(),
        });
        let session = Session::new(Box::new(plane), CancelToken::new(), None);
        let err = run(&session, "s-1", &definition_file(dir.path()), true).unwrap_err();
        assert_eq!(err.code, EXIT_REMOTE_ERROR);
        assert!(err.message.contains("Template format error"));
    }
}
