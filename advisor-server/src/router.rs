use advisor_core::ipc::{AdvisorRequest, AdvisorResponse};
use advisor_core::Assistant;

pub async fn handle_request(request: AdvisorRequest, assistant: &Assistant) -> AdvisorResponse {
    match request {
        AdvisorRequest::Ping => AdvisorResponse::pong(),
        AdvisorRequest::Health => match serde_json::to_value(assistant.health()) {
            Ok(components) => AdvisorResponse::ok(serde_json::json!({
                "status": "healthy",
                "components": components,
            })),
            Err(e) => AdvisorResponse::err(format!("Health serialization failed: {}", e)),
        },
        AdvisorRequest::Ask { question, history } => {
            let stats = assistant.conversation_stats(&history);
            match assistant.ask(&question, &history).await {
                Ok(reply) => reply_response(reply, Some(stats)),
                Err(e) => AdvisorResponse::err(e.user_message()),
            }
        }
        AdvisorRequest::Chart { description } => match assistant.chart(&description).await {
            Ok(reply) => reply_response(reply, None),
            Err(e) => AdvisorResponse::err(e.user_message()),
        },
    }
}

fn reply_response(
    reply: advisor_core::models::AssistantReply,
    stats: Option<advisor_core::ConversationStats>,
) -> AdvisorResponse {
    match serde_json::to_value(&reply) {
        Ok(mut data) => {
            if let (Some(obj), Some(stats)) = (data.as_object_mut(), stats) {
                obj.insert(
                    "conversation".to_string(),
                    serde_json::to_value(stats).unwrap_or_default(),
                );
            }
            AdvisorResponse::ok(data)
        }
        Err(e) => AdvisorResponse::err(format!("Reply serialization failed: {}", e)),
    }
}
