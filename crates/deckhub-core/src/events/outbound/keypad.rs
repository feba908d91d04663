use super::{GenericInstancePayload, send_to_plugin};

use crate::shared::{ActionContext, Context};
use crate::store::profiles::{acquire_locks_mut, get_slot_mut, save_profile};
use crate::ui::{self, UiEvent};

use serde::Serialize;

#[derive(Serialize)]
struct KeyEvent {
    event: &'static str,
    action: String,
    context: ActionContext,
    device: String,
    payload: GenericInstancePayload,
}

fn next_state(current: u16, count: usize) -> u16 {
    if count == 0 {
        return 0;
    }
    (current + 1) % (count as u16)
}

pub async fn key_down(device: &str, key: u8) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let selected_profile = locks.device_stores.get_selected_profile(device)?;
    let context = Context {
        device: device.to_owned(),
        profile: selected_profile,
        controller: "Keypad".to_owned(),
        position: key,
    };

    ui::emit(UiEvent::KeyMoved {
        context: context.clone(),
        down: true,
    });

    let Some(instance) = get_slot_mut(&context, &mut locks).await? else {
        return Ok(());
    };
    send_to_plugin(
        &instance.action.plugin,
        &KeyEvent {
            event: "keyDown",
            action: instance.action.uuid.clone(),
            context: instance.context.clone(),
            device: instance.context.device.clone(),
            payload: GenericInstancePayload::new(instance),
        },
    )
    .await?;

    Ok(())
}

pub async fn key_up(device: &str, key: u8) -> Result<(), anyhow::Error> {
    let mut locks = acquire_locks_mut().await;
    let selected_profile = locks.device_stores.get_selected_profile(device)?;
    let context = Context {
        device: device.to_owned(),
        profile: selected_profile,
        controller: "Keypad".to_owned(),
        position: key,
    };

    ui::emit(UiEvent::KeyMoved {
        context: context.clone(),
        down: false,
    });

    let slot = get_slot_mut(&context, &mut locks).await?;
    let Some(instance) = slot else { return Ok(()) };

    // Every release advances the state cycle; a full cycle returns to state 0.
    instance.current_state = next_state(instance.current_state, instance.states.len());
    send_to_plugin(
        &instance.action.plugin,
        &KeyEvent {
            event: "keyUp",
            action: instance.action.uuid.clone(),
            context: instance.context.clone(),
            device: instance.context.device.clone(),
            payload: GenericInstancePayload::new(instance),
        },
    )
    .await?;

    ui::emit(UiEvent::ActionStateChanged {
        context: instance.context.clone(),
    });
    save_profile(device, &context.profile, &mut locks).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::next_state;

    #[test]
    fn state_cycle_returns_to_origin() {
        let mut state = 0;
        for _ in 0..3 {
            state = next_state(state, 3);
        }
        assert_eq!(state, 0);
    }

    #[test]
    fn single_state_stays_put() {
        assert_eq!(next_state(0, 1), 0);
        assert_eq!(next_state(0, 0), 0);
    }
}
