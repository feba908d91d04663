use crate::shared::{Action, ActionContext, ActionInstance, ActionState, Context};
use crate::store::profiles::{acquire_locks_mut, get_slot_mut, save_profile};
use crate::ui::{self, UiEvent};

fn init_states(action: &Action) -> Vec<ActionState> {
    let mut states = action.states.clone();
    for state in states.iter_mut() {
        if state.text.trim().is_empty() {
            state.text = action.name.clone();
        }
    }
    states
}

/// Place a new instance of an action into an empty slot.
///
/// Returns `None` if the action does not support the slot's controller or the
/// slot is already occupied.
pub async fn create_instance(
    action: Action,
    context: Context,
) -> Result<Option<ActionInstance>, anyhow::Error> {
    if !action.controllers.contains(&context.controller) {
        return Ok(None);
    }

    let mut locks = acquire_locks_mut().await;
    let slot = get_slot_mut(&context, &mut locks).await?;
    if slot.is_some() {
        return Ok(None);
    }

    let instance = ActionInstance {
        states: init_states(&action),
        action,
        context: ActionContext::from_context(context.clone(), 0),
        current_state: 0,
        settings: serde_json::Value::Object(serde_json::Map::new()),
    };

    *slot = Some(instance.clone());

    save_profile(&context.device, &context.profile, &mut locks).await?;
    let _ = crate::events::outbound::will_appear::will_appear(&instance).await;
    ui::emit(UiEvent::ActionStateChanged {
        context: instance.context.clone(),
    });

    Ok(Some(instance))
}

/// Move an instance to another slot of the same controller type.
///
/// With `retain` set the source keeps its copy (duplication); otherwise the
/// source slot is emptied and the plugin is told the old context disappeared.
pub async fn move_instance(
    source: Context,
    destination: Context,
    retain: bool,
) -> Result<Option<ActionInstance>, anyhow::Error> {
    if source.controller != destination.controller {
        return Ok(None);
    }

    {
        let locks = crate::store::profiles::acquire_locks().await;
        let dst = crate::store::profiles::get_slot(&destination, &locks).await?;
        if dst.is_some() {
            return Ok(None);
        }
    }

    let mut locks = acquire_locks_mut().await;
    let src = get_slot_mut(&source, &mut locks).await?;

    let Some(mut new) = src.clone() else {
        return Ok(None);
    };
    new.context = ActionContext::from_context(destination.clone(), 0);

    if !retain {
        if let Some(old) = src {
            let _ = crate::events::outbound::will_appear::will_disappear(old, true).await;
        }
        *src = None;
    }

    let dst = get_slot_mut(&destination, &mut locks).await?;
    *dst = Some(new.clone());

    let _ = crate::events::outbound::will_appear::will_appear(&new).await;
    save_profile(&destination.device, &destination.profile, &mut locks).await?;
    ui::emit(UiEvent::ActionStateChanged {
        context: new.context.clone(),
    });

    Ok(Some(new))
}

pub async fn remove_instance(context: ActionContext) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let slot = get_slot_mut(&(&context).into(), &mut locks).await?;
    let Some(instance) = slot else {
        return Ok(());
    };

    if instance.context == context {
        let _ = crate::events::outbound::will_appear::will_disappear(instance, true).await;
        *slot = None;
    }

    save_profile(&context.device, &context.profile, &mut locks).await?;
    Ok(())
}

/// Replace an instance with an edited copy and re-announce its title metadata.
pub async fn set_state(instance: ActionInstance, state: u16) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    if let Some(reference) =
        crate::store::profiles::get_instance_mut(&instance.context, &mut locks).await?
    {
        *reference = instance.clone();
        save_profile(&instance.context.device, &instance.context.profile, &mut locks).await?;
        crate::events::outbound::states::title_parameters_did_change(&instance, state).await?;
        ui::emit(UiEvent::ActionStateChanged {
            context: instance.context,
        });
    }
    Ok(())
}

/// Update an instance's settings on behalf of the host and notify the plugin,
/// as a property inspector would.
pub async fn set_instance_settings(
    context: ActionContext,
    settings: serde_json::Value,
) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;

    if let Some(instance) = crate::store::profiles::get_instance_mut(&context, &mut locks).await? {
        instance.settings = settings;
        crate::events::outbound::settings::did_receive_settings(instance, false).await?;
        ui::emit(UiEvent::ActionStateChanged {
            context: instance.context.clone(),
        });
        save_profile(&context.device, &context.profile, &mut locks).await?;
    }

    Ok(())
}
