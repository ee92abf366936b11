use crate::repositories::memberships::MembershipOracle;
use crate::repositories::messages::MessageStore;
use crate::repositories::notifications::NotificationDispatcher;
use crate::repositories::users::UserInfoProvider;

/// Access to the collaborators the use-case layer is allowed to talk to.
/// Everything behind these interfaces (SQL, caching, push delivery) is
/// outside this service's core.
pub trait Context: Sync + Send {
    fn store(&self) -> &dyn MessageStore;
    fn memberships(&self) -> &dyn MembershipOracle;
    fn users(&self) -> &dyn UserInfoProvider;
    fn notifications(&self) -> &dyn NotificationDispatcher;
}
