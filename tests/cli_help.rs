use clap::CommandFactory;

use SessionVault::cli::Cli;

#[test]
fn every_subcommand_has_a_description() {
    let cmd = Cli::command();
    for sub in cmd.get_subcommands() {
        assert!(
            sub.get_about().is_some(),
            "subcommand '{}' has no help text",
            sub.get_name()
        );
    }
    assert!(cmd.find_subcommand("inspect").is_some());
}

#[test]
fn help_mentions_lock_sidecar() {
    let help = Cli::command().render_long_help().to_string();
    assert!(help.contains("<file>.lock"), "{help}");
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}
