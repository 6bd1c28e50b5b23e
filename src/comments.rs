//! Comments attached to entries
//!
//! A kind whose entries can be commented on implements [`Commentable`], naming the kind of its
//! comments and where they are listed and posted.

use std::sync::Arc;

use crate::async_ops::PendingQuery;
use crate::authorization::AuthorizationDomain;
use crate::cancel::Cancellable;
use crate::entry::{Entry, EntryKind};
use crate::error::{Error, ErrorKind, Result};
use crate::feed::{Feed, ProgressCallback};
use crate::query::Query;
use crate::service::Service;

/// A comment with no service-specific fields.
///
/// Its body is the entry's content, and whoever wrote it is the entry's first author.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Comment;

impl EntryKind for Comment {}

/// A kind of entry that can be commented on
pub trait Commentable: EntryKind {
    type Comment: EntryKind;

    /// The domain whose credentials are used for comments
    fn authorization_domain() -> Option<Arc<AuthorizationDomain>> {
        None
    }

    /// Where the comments of `entry` are listed. `None` when it has no comments.
    fn query_comments_uri(entry: &Entry<Self>) -> Option<String>;

    /// Where `comment` can be posted. `None` when `entry` does not accept comments.
    fn insert_comment_uri(entry: &Entry<Self>, comment: &Entry<Self::Comment>) -> Option<String>;

    fn is_comment_deletable(entry: &Entry<Self>, comment: &Entry<Self::Comment>) -> bool;
}

fn comments_uri<K: Commentable>(entry: &Entry<K>) -> Result<String> {
    K::query_comments_uri(entry)
        .ok_or_else(|| Error::new(ErrorKind::Forbidden, "This entry does not support comments."))
}

impl Service {
    /// Fetches the comments of `entry`.
    ///
    /// Like [`Service::query`], `query` gets the pagination state of the returned feed.
    pub async fn query_comments<K: Commentable>(
        &self,
        entry: &Entry<K>,
        query: Option<&mut Query>,
        cancellable: Option<&Cancellable>,
        progress: Option<&mut ProgressCallback<'_, K::Comment>>,
    ) -> Result<Option<Feed<K::Comment>>> {
        let uri = comments_uri(entry)?;
        self.query(K::authorization_domain().as_ref(), &uri, query, cancellable, progress).await
    }

    /// Starts [`Service::query_comments`] in the background.
    ///
    /// Fails at once if the entry has no comments.
    pub fn query_comments_async<K: Commentable>(
        &self,
        entry: &Entry<K>,
        query: Option<&Query>,
        cancellable: Option<Cancellable>,
    ) -> Result<PendingQuery<K::Comment>> {
        let uri = comments_uri(entry)?;
        Ok(self.query_async(K::authorization_domain(), &uri, query, cancellable))
    }

    /// Posts `comment` on `entry`, and returns the server's version of it
    pub async fn insert_comment<K: Commentable>(
        &self,
        entry: &Entry<K>,
        comment: &Entry<K::Comment>,
        cancellable: Option<&Cancellable>,
    ) -> Result<Entry<K::Comment>> {
        let uri = K::insert_comment_uri(entry, comment)
            .ok_or_else(|| Error::new(ErrorKind::Forbidden, "Comments may not be added to this entry."))?;
        self.insert_entry(K::authorization_domain().as_ref(), &uri, comment, cancellable).await
    }

    /// Deletes `comment` from `entry`. Nothing is sent when the kind does not allow it.
    pub async fn delete_comment<K: Commentable>(
        &self,
        entry: &Entry<K>,
        comment: &Entry<K::Comment>,
        cancellable: Option<&Cancellable>,
    ) -> Result<bool> {
        if K::is_comment_deletable(entry, comment) == false {
            return Err(Error::new(ErrorKind::Forbidden, "This comment may not be deleted."));
        }
        self.delete_entry(K::authorization_domain().as_ref(), comment, cancellable).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::atom::{Author, Link};
    use crate::config::ServiceConfig;
    use crate::entry::Content;
    use crate::mock_transport::{MockReply, MockTransport};
    use crate::service::GenericService;

    const REPLIES: &str = "http://example.com/rel#replies";

    /// Photos accept comments when they link to a comment feed, and only their author may delete them
    #[derive(Clone, Debug, Default, PartialEq)]
    struct Photo;

    impl EntryKind for Photo {}

    impl Commentable for Photo {
        type Comment = Comment;

        fn query_comments_uri(entry: &Entry<Self>) -> Option<String> {
            entry.look_up_link(REPLIES).map(|link| link.uri().to_string())
        }

        fn insert_comment_uri(entry: &Entry<Self>, _comment: &Entry<Comment>) -> Option<String> {
            Self::query_comments_uri(entry)
        }

        fn is_comment_deletable(entry: &Entry<Self>, comment: &Entry<Comment>) -> bool {
            match (entry.authors().first(), comment.authors().first()) {
                (Some(owner), Some(writer)) => owner.name() == writer.name(),
                _ => false,
            }
        }
    }

    const COMMENTS: &str = r#"<feed xmlns="http://www.w3.org/2005/Atom">
    <id>https://example.com/photos/1/comments</id>
    <updated>2025-01-01T00:00:00Z</updated>
    <link rel="next" href="https://example.com/photos/1/comments?page=2"/>
    <entry>
        <id>https://example.com/photos/1/comments/1</id>
        <content type="text">Lovely light</content>
        <author><name>Jane Doe</name></author>
        <link rel="edit" href="https://example.com/photos/1/comments/1"/>
    </entry>
</feed>"#;

    fn service(transport: Arc<MockTransport>) -> Service {
        Service::with_transport(GenericService, None, ServiceConfig::default(), transport)
    }

    fn photo(with_comments: bool) -> Entry<Photo> {
        let mut photo = Entry::new(Some("https://example.com/photos/1"));
        photo.add_author(Author::new("Joe Bloggs", None, None));
        if with_comments {
            photo.add_link(Link::new("https://example.com/photos/1/comments", Some(REPLIES)));
        }
        photo
    }

    fn comment(author: &str, text: &str) -> Entry<Comment> {
        let mut comment = Entry::new(Some("https://example.com/photos/1/comments/2"));
        comment.add_author(Author::new(author, None, None));
        comment.set_content(Some(Content::Text(text.to_string())));
        comment.add_link(Link::new("https://example.com/photos/1/comments/2", Some("edit")));
        comment
    }

    #[tokio::test]
    async fn list_comments() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::atom(COMMENTS));
        let service = service(transport.clone());

        let mut query = Query::new(None);
        query.set_max_results(10);
        let comments = service.query_comments(&photo(true), Some(&mut query), None, None).await.unwrap().unwrap();
        let first = &comments.entries()[0];
        assert_eq!(first.content(), Some(&Content::Text("Lovely light".into())));
        assert_eq!(first.authors()[0].name(), "Jane Doe");
        assert_eq!(query.next_uri(), Some("https://example.com/photos/1/comments?page=2"));

        assert_eq!(transport.requests()[0].uri.as_str(), "https://example.com/photos/1/comments?max-results=10");
    }

    #[tokio::test]
    async fn entries_without_comments() {
        let transport = Arc::new(MockTransport::new());
        let service = service(transport.clone());

        let err = service.query_comments(&photo(false), None, None, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.message(), "This entry does not support comments.");
        assert!(service.query_comments_async(&photo(false), None, None).is_err());

        let mut new_comment: Entry<Comment> = Entry::new(None);
        new_comment.set_content(Some(Content::Text("Nice".into())));
        let err = service.insert_comment(&photo(false), &new_comment, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.message(), "Comments may not be added to this entry.");
        assert_eq!(transport.sent_count(), 0);
    }

    #[tokio::test]
    async fn post_and_delete_comments() {
        let _ = env_logger::builder().is_test(true).try_init();
        let transport = Arc::new(MockTransport::new());
        transport.push(MockReply::status(201)
            .with_header("Content-Type", "application/atom+xml")
            .with_body("<entry xmlns='http://www.w3.org/2005/Atom'><id>https://example.com/photos/1/comments/3</id><content>Great</content></entry>"));
        transport.push(MockReply::status(204));
        let service = service(transport.clone());

        let mut new_comment: Entry<Comment> = Entry::new(None);
        new_comment.set_content(Some(Content::Text("Great".into())));
        let posted = service.insert_comment(&photo(true), &new_comment, None).await.unwrap();
        assert_eq!(posted.id(), Some("https://example.com/photos/1/comments/3"));

        let err = service.delete_comment(&photo(true), &comment("Jane Doe", "Nice"), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(err.message(), "This comment may not be deleted.");
        assert_eq!(transport.sent_count(), 1);

        assert!(service.delete_comment(&photo(true), &comment("Joe Bloggs", "Mine"), None).await.unwrap());

        let requests = transport.requests();
        assert_eq!(requests[0].uri.as_str(), "https://example.com/photos/1/comments");
        let body = String::from_utf8(requests[0].body.clone().unwrap()).unwrap();
        assert!(body.contains("<content type='text'>Great</content>"));
        assert_eq!(requests[1].uri.as_str(), "https://example.com/photos/1/comments/2");
    }
}
