//! Random event prompts posted under chat messages.

use crate::{
    bot::{BotData, levels::celebrate, respond::colors},
    core::{
        guild::clear_event_slot,
        ledger::MemberKey,
        leveling::apply_xp_gain,
        modules::{EventSettings, LevelSettings, decode_settings, find_module, module_settings},
        random_event::{EVENT_TIMEOUT, EventChoice, EventKind, EventResolution, RandomEvent, resolve, try_spawn},
    },
    entities::ModuleName,
    errors::Result,
};
use chrono::{DateTime, Utc};
use poise::serenity_prelude as serenity;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info, warn};

fn prompt_message(event: &RandomEvent) -> serenity::CreateMessage {
    let buttons = event
        .choices
        .iter()
        .map(|choice| {
            serenity::CreateButton::new(choice.custom_id())
                .label(choice.label())
                .style(serenity::ButtonStyle::Primary)
        })
        .collect();
    let embed = serenity::CreateEmbed::default()
        .title("Random event")
        .description(event.intro())
        .footer(serenity::CreateEmbedFooter::new(format!(
            "Event #{} - first click wins",
            event.scenario
        )))
        .color(colors::GOLD);
    serenity::CreateMessage::new()
        .embed(embed)
        .components(vec![serenity::CreateActionRow::Buttons(buttons)])
}

fn outcome_text(user_id: serenity::UserId, kind: EventKind, resolution: EventResolution) -> String {
    let unit = match kind {
        EventKind::Coins => "coins",
        EventKind::Xp => "XP",
    };
    match resolution {
        EventResolution::Empty => match kind {
            EventKind::Coins => format!("<@{user_id}> opened the purse. It was empty."),
            EventKind::Xp => format!("<@{user_id}> opened the grimoire. Its pages were blank."),
        },
        EventResolution::Plain(amount) => format!("<@{user_id}> gained **{amount}** {unit}."),
        EventResolution::Bonus(amount) => {
            format!("<@{user_id}> took a closer look and gained **{amount}** {unit}.")
        }
    }
}

/// Pays the winner of an event.
async fn pay(
    ctx: &serenity::Context,
    data: &BotData,
    key: &MemberKey,
    kind: EventKind,
    amount: i64,
    channel_id: serenity::ChannelId,
) -> Result<()> {
    if amount <= 0 {
        return Ok(());
    }
    match kind {
        EventKind::Coins => {
            data.economy().add_wallet_coins(key, amount).await?;
        }
        EventKind::Xp => {
            let settings: LevelSettings = module_settings(
                &*data.database,
                &key.guild_id,
                ModuleName::Level,
                data.module_defaults.level.clone(),
            )
            .await?;
            if let Some(change) =
                apply_xp_gain(&*data.database, key, amount, settings.max_level).await?
            {
                celebrate(ctx, data, key, &change, Some(channel_id)).await?;
            }
        }
    }
    Ok(())
}

/// Rolls for a random event after a message and runs it to completion.
///
/// The first button click within the timeout wins. Without a click the
/// prompt is deleted and the guild may spawn another event right away.
pub async fn maybe_spawn_event(
    ctx: &serenity::Context,
    data: &BotData,
    guild_id: serenity::GuildId,
    channel_id: serenity::ChannelId,
    now: DateTime<Utc>,
) -> Result<()> {
    let guild_key = guild_id.to_string();
    let Some(module) = find_module(&*data.database, &guild_key, ModuleName::Event).await? else {
        return Ok(());
    };
    if !module.is_active {
        return Ok(());
    }
    let settings: EventSettings = decode_settings(&module)?;

    let (event, roll) = {
        let mut rng = StdRng::from_os_rng();
        let event = try_spawn(&*data.database, &guild_key, &settings, now, &mut rng).await?;
        (event, rng.random::<f64>())
    };
    let Some(event) = event else {
        return Ok(());
    };

    let prompt = channel_id.send_message(&ctx.http, prompt_message(&event)).await?;
    let interaction = prompt
        .await_component_interaction(ctx)
        .timeout(EVENT_TIMEOUT)
        .await;

    let Some(interaction) = interaction else {
        debug!("Event in guild {} expired", guild_id);
        clear_event_slot(&*data.database, &guild_key).await?;
        if let Err(e) = prompt.delete(&ctx.http).await {
            warn!("Failed to delete expired event prompt: {}", e);
        }
        return Ok(());
    };

    let Some(choice) = EventChoice::from_custom_id(&interaction.data.custom_id)
        .or_else(|| event.choices.first().copied())
    else {
        return Ok(());
    };
    let resolution = resolve(&event, choice, roll);
    let winner = interaction.user.id;
    info!(
        "{} won a {:?} event in guild {}: {:?}",
        winner, event.kind, guild_id, resolution
    );

    let embed = serenity::CreateEmbed::default()
        .title("Random event")
        .description(outcome_text(winner, event.kind, resolution))
        .color(colors::GREEN);
    interaction
        .create_response(
            ctx,
            serenity::CreateInteractionResponse::UpdateMessage(
                serenity::CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .components(Vec::new()),
            ),
        )
        .await?;

    let key = MemberKey::new(winner.to_string(), guild_key);
    pay(ctx, data, &key, event.kind, resolution.amount(), channel_id).await
}
