use anyhow::Result;

use super::display::{interaction_line, print_stage_history};
use super::{parse_id, LogArgs, Session};
use crate::models::{Direction, InteractionType, NewInteraction, Stage, StageUpdate};

/// How many history rows `history` prints.
const HISTORY_LIMIT: u32 = 50;

pub fn run_stage(session: &Session, id: &str, stage: &str, reason: Option<String>) -> Result<()> {
    let contact_id = parse_id(id)?;
    let stage: Stage = stage.parse().map_err(anyhow::Error::msg)?;

    let contact = session.service().update_contact_stage(
        StageUpdate {
            contact_id,
            stage,
            reason,
        },
        &session.ctx,
    )?;
    println!("{} is now {}", contact.full_name(), contact.stage.label());
    Ok(())
}

pub fn run_log(session: &Session, args: LogArgs) -> Result<()> {
    let contact_id = parse_id(&args.id)?;
    let interaction_type: InteractionType = args.interaction_type.parse().map_err(anyhow::Error::msg)?;
    let direction: Direction = args.direction.parse().map_err(anyhow::Error::msg)?;

    let interaction = session.service().log_interaction(
        NewInteraction {
            contact_id,
            interaction_type,
            direction,
            subject: args.subject,
            body: args.body,
            ..Default::default()
        },
        &session.ctx,
    )?;
    println!("Logged {}", interaction_line(&interaction));
    Ok(())
}

pub fn run_history(session: &Session, id: &str) -> Result<()> {
    let contact_id = parse_id(id)?;
    let history = session
        .service()
        .get_contact_stage_history(contact_id, &session.ctx, Some(HISTORY_LIMIT))?;
    print_stage_history(&history);
    Ok(())
}
