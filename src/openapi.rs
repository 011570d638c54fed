use crate::models::{Answer, Channel, ChannelDetail, Permission, Role, Thread, User};
use crate::routes::{accounts, answers, channels, threads};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        channels::list_channels,
        channels::show_channel,
        channels::create_channel,
        channels::update_channel,
        channels::destroy_channel,
        threads::list_threads,
        threads::show_thread,
        threads::create_thread,
        threads::update_thread,
        threads::set_best_answer,
        threads::destroy_thread,
        answers::list_answers,
        answers::create_answer,
        answers::destroy_answer,
        accounts::register,
        accounts::login,
        accounts::me,
        accounts::block_user,
        accounts::assign_role,
    ),
    components(schemas(
        User, Role, Permission, Channel, ChannelDetail, Thread, Answer,
        channels::CreateChannelRequest, channels::UpdateChannelRequest, channels::DestroyChannelRequest,
        threads::CreateThreadRequest, threads::UpdateThreadRequest, threads::BestAnswerRequest,
        answers::CreateAnswerRequest,
        accounts::RegisterRequest, accounts::LoginRequest, accounts::BlockRequest,
        accounts::AssignRoleRequest, accounts::AuthResponse, accounts::MeResponse, accounts::RolesResponse,
    )),
    tags(
        (name = "channels", description = "Channel operations"),
        (name = "threads", description = "Thread and answer operations"),
        (name = "accounts", description = "Registration, sign-in and moderation"),
    )
)]
pub struct ApiDoc;
