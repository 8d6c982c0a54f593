use super::*;

#[test]
fn parses_known_permission_tags() {
    assert_eq!(parse_permission("FILE_READ"), Some(Permission::FileRead));
    assert_eq!(parse_permission(" TERMINAL_CREATE "), Some(Permission::TerminalCreate));
    assert_eq!(parse_permission("WORKSPACE_MANAGE"), Some(Permission::WorkspaceManage));
}

#[test]
fn rejects_unknown_permission_tags() {
    assert_eq!(parse_permission("NOT_A_PERMISSION"), None);
    assert_eq!(parse_permission(""), None);
}
