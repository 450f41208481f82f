use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use crate::{services::Services, websocket};

/// Largest accepted frame. A 5 MiB receipt grows by a third once base64
/// encoded.
pub const MAX_FRAME_SIZE: usize = 8 * 1024 * 1024;

async fn ws_route(
    req: HttpRequest,
    stream: web::Payload,
    services: web::Data<Services>,
) -> Result<HttpResponse, Error> {
    ws::WsResponseBuilder::new(
        websocket::WsClient::new(services.get_ref().clone()),
        &req,
        stream,
    )
    .frame_size(MAX_FRAME_SIZE)
    .start()
}

pub fn configure(cfg: &mut web::ServiceConfig, services: Services) {
    // websocket
    cfg.app_data(web::Data::new(services))
        .service(web::resource("/ws/").to(ws_route));
}
