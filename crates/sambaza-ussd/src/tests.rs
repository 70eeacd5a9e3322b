use crate::menu::{MenuError, UssdMenu, UssdReply};

fn sample_menu() -> UssdMenu {
    UssdMenu::from_json(
        r#"{
            "screens": {
                "root": {
                    "text": "Welcome to Duka\n1. Check balance\n2. Buy bundles\n3. Exit",
                    "options": {
                        "1": "end:Your balance is KES 120",
                        "2": "screen:bundles",
                        "3": "end:Goodbye"
                    }
                },
                "bundles": {
                    "text": "Bundles\n1. Daily 50MB\n2. Weekly 500MB\n0. Back",
                    "options": {
                        "1": "end:Daily bundle activated",
                        "2": "end:Weekly bundle activated",
                        "0": "screen:root"
                    }
                }
            }
        }"#,
    )
    .expect("sample menu should validate")
}

#[test]
fn empty_input_shows_root_screen() {
    let menu = sample_menu();
    let t = menu.traverse("");
    assert_eq!(t.screen, "root");
    assert!(t.path.is_empty());
    match t.reply {
        UssdReply::Continue(ref text) => assert!(text.starts_with("Welcome to Duka")),
        _ => panic!("root should continue"),
    }
    assert!(t.reply.render().starts_with("CON Welcome"));
}

#[test]
fn walks_into_nested_screen() {
    let menu = sample_menu();
    let t = menu.traverse("2");
    assert_eq!(t.screen, "bundles");
    assert_eq!(t.path, vec!["2"]);
    assert!(!t.reply.is_terminal());
}

#[test]
fn terminal_option_ends_session() {
    let menu = sample_menu();
    let t = menu.traverse("2*1");
    assert_eq!(t.path, vec!["2", "1"]);
    assert_eq!(t.reply, UssdReply::End("Daily bundle activated".to_string()));
    assert_eq!(t.reply.render(), "END Daily bundle activated");
}

#[test]
fn invalid_choice_replays_current_screen() {
    let menu = sample_menu();
    let t = menu.traverse("2*9");
    assert_eq!(t.screen, "bundles");
    // The consumed path keeps only the valid tokens.
    assert_eq!(t.path, vec!["2"]);
    match t.reply {
        UssdReply::Continue(ref text) => {
            assert!(text.starts_with("Invalid choice."));
            assert!(text.contains("Bundles"));
        }
        _ => panic!("invalid choice should not terminate"),
    }
}

#[test]
fn tokens_after_terminal_are_ignored() {
    let menu = sample_menu();
    let t = menu.traverse("3*1*2");
    assert_eq!(t.reply, UssdReply::End("Goodbye".to_string()));
    assert_eq!(t.path, vec!["3"]);
}

#[test]
fn back_edge_cycles_are_bounded_by_input_length() {
    let menu = sample_menu();
    // root -> bundles -> root -> bundles
    let t = menu.traverse("2*0*2");
    assert_eq!(t.screen, "bundles");
    assert_eq!(t.path, vec!["2", "0", "2"]);
}

#[test]
fn missing_root_is_rejected() {
    let err = UssdMenu::from_json(r#"{"screens": {"home": {"text": "hi"}}}"#).unwrap_err();
    assert!(matches!(err, MenuError::MissingRoot));
}

#[test]
fn unknown_screen_reference_is_rejected() {
    let err = UssdMenu::from_json(
        r#"{"screens": {"root": {"text": "hi", "options": {"1": "screen:nowhere"}}}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, MenuError::UnknownScreen { .. }));
}

#[test]
fn malformed_target_is_rejected() {
    let err = UssdMenu::from_json(
        r#"{"screens": {"root": {"text": "hi", "options": {"1": "goto:somewhere"}}}}"#,
    )
    .unwrap_err();
    assert!(matches!(err, MenuError::BadTarget { .. }));
}
