use state_machines::state_machine;

state_machine! {
    name: IngestionMachine,
    state: IngestionState,
    initial: Ready,
    states: [Ready, Validated, Extracted, Staged, Committed, Failed, Cancelled],
    events {
        validate { transition: { from: Ready, to: Validated } }
        extract { transition: { from: Validated, to: Extracted } }
        stage { transition: { from: Extracted, to: Staged } }
        commit { transition: { from: Staged, to: Committed } }
        abort {
            transition: { from: Ready, to: Failed }
            transition: { from: Validated, to: Failed }
            transition: { from: Extracted, to: Failed }
            transition: { from: Staged, to: Failed }
        }
        cancel {
            transition: { from: Ready, to: Cancelled }
            transition: { from: Validated, to: Cancelled }
            transition: { from: Extracted, to: Cancelled }
            transition: { from: Staged, to: Cancelled }
        }
    }
}

pub fn ready() -> IngestionMachine<(), Ready> {
    IngestionMachine::new(())
}
