//! Virtual filesystem behavior over an in-memory site with the real collaborators.

use std::sync::Arc;

use time::{OffsetDateTime, macros::datetime};

use vellum::{
    application::{
        site_config::SiteConfig,
        vfs::{Collaborators, Opened, VfsError, VirtualFs},
    },
    domain::entry::EntryKind,
    infra::{
        front_matter::TomlFrontMatter, markdown::ComrakRenderer, store::MemoryStore,
        templates::PlaceholderCompiler,
    },
};

const MODIFIED: OffsetDateTime = datetime!(2024-01-01 12:00 UTC);

fn collaborators() -> Collaborators {
    Collaborators {
        renderer: Arc::new(ComrakRenderer::new()),
        decoder: Arc::new(TomlFrontMatter),
        compiler: Arc::new(PlaceholderCompiler::new()),
    }
}

async fn site(files: &[(&str, &str)]) -> (Arc<MemoryStore>, VirtualFs) {
    let store = Arc::new(MemoryStore::with_files(files.iter().copied(), MODIFIED));
    let vfs = VirtualFs::new(store.clone(), collaborators())
        .await
        .expect("filesystem builds");
    (store, vfs)
}

fn body(opened: Opened) -> String {
    match opened {
        Opened::File(file) => String::from_utf8(file.body.to_vec()).expect("utf-8 body"),
        other => panic!("expected a file, got {other:?}"),
    }
}

#[tokio::test]
async fn markdown_page_renders_through_default_template() {
    let (_, vfs) = site(&[(
        "blog/post1.md",
        "+++\ntitle = \"Hello\"\ndate = 2020-05-01\n+++\n# Heading\n\nSome *text*.\n",
    )])
    .await;

    let opened = vfs.open("blog/post1.html").await.unwrap();
    let Opened::File(file) = &opened else {
        panic!("expected a file, got {opened:?}");
    };
    assert_eq!(file.kind, EntryKind::MarkdownVirtual);
    assert_eq!(file.info.name, "post1.html");
    assert_eq!(file.info.size, file.body.len() as u64);
    let front_matter = file.front_matter.as_ref().unwrap();
    assert_eq!(front_matter.title, "Hello");
    assert_eq!(front_matter.template, "default");

    let html = body(opened);
    assert!(html.contains("<title>Hello</title>"), "{html}");
    assert!(html.contains("<em>text</em>"), "{html}");
}

#[tokio::test]
async fn raw_markdown_is_never_visible() {
    let (_, vfs) = site(&[("x.md", "hello")]).await;
    assert!(vfs.open("x.html").await.is_ok());
    let err = vfs.open("x.md").await.unwrap_err();
    assert!(matches!(err, VfsError::NotExist { .. }), "{err:?}");
}

#[tokio::test]
async fn physical_html_wins_over_markdown() {
    let (_, vfs) = site(&[("a.md", "from markdown"), ("a.html", "<p>static</p>")]).await;
    let opened = vfs.open("a.html").await.unwrap();
    assert_eq!(body(opened), "<p>static</p>");
}

#[tokio::test]
async fn future_dated_pages_do_not_exist() {
    let (_, vfs) = site(&[
        ("soon.md", "+++\ndate = 2999-01-01\n+++\nlater"),
        ("gone.md", "+++\ndate = 2999-01-01\nredirect = \"/new\"\n+++\n"),
    ])
    .await;

    for path in ["soon.html", "gone.html"] {
        let err = vfs.open(path).await.unwrap_err();
        assert!(err.is_not_found(), "{path}: {err:?}");
    }
    let names: Vec<String> = vfs
        .read_dir(".")
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.info.name)
        .collect();
    assert!(names.contains(&"soon.html".to_string()));
}

#[tokio::test]
async fn redirect_is_a_result_not_content() {
    let (_, vfs) = site(&[("old.md", "+++\nredirect = \"/new\"\n+++\nignored")]).await;
    match vfs.open("old.html").await.unwrap() {
        Opened::Redirect(redirect) => {
            assert_eq!(redirect.target, "/new");
            assert_eq!(redirect.info.name, "old.html");
        }
        other => panic!("expected a redirect, got {other:?}"),
    }
}

#[tokio::test]
async fn hidden_and_reserved_paths_do_not_exist() {
    let (_, vfs) = site(&[
        (".env", "SECRET=1"),
        ("blog/.draft.md", "draft"),
        ("template/default.html", "{{{ content }}}"),
        ("site.toml", "expires = \"1m\""),
        ("blog/template/x.txt", "visible"),
    ])
    .await;

    for path in [".env", "blog/.draft.html", "template/default.html", "template", "site.toml"] {
        let err = vfs.open(path).await.unwrap_err();
        assert!(matches!(err, VfsError::NotExist { .. }), "{path}: {err:?}");
    }
    assert!(vfs.open("blog/template/x.txt").await.is_ok());
}

#[tokio::test]
async fn malformed_paths_are_rejected() {
    let (_, vfs) = site(&[("a.txt", "a")]).await;
    for path in ["", "a//b", "../a.txt", "a/./b", "/a.txt"] {
        let err = vfs.open(path).await.unwrap_err();
        assert!(matches!(err, VfsError::InvalidPath { .. }), "{path:?}: {err:?}");
    }
}

#[tokio::test]
async fn malformed_front_matter_falls_back_to_defaults() {
    let (_, vfs) = site(&[("notes.md", "+++\ntitle = \n+++\nbody text")]).await;
    let opened = vfs.open("notes.html").await.unwrap();
    let Opened::File(file) = opened else {
        panic!("expected a file");
    };
    let front_matter = file.front_matter.unwrap();
    assert_eq!(front_matter.title, "notes");
    assert_eq!(front_matter.date, MODIFIED);
}

#[tokio::test]
async fn unknown_template_fails_the_read() {
    let (_, vfs) = site(&[("a.md", "+++\ntemplate = \"missing\"\n+++\nbody")]).await;
    let err = vfs.open("a.html").await.unwrap_err();
    assert!(matches!(err, VfsError::Transform { .. }), "{err:?}");
}

#[tokio::test]
async fn site_templates_override_builtins() {
    let (_, vfs) = site(&[
        ("template/default.html", "<main>{{ front_matter.title }}|{{{ content }}}</main>"),
        ("template/post.html", "<article>{{ page.pathname }}</article>"),
        ("a.md", "+++\ntitle = \"A & B\"\n+++\nhi"),
        ("b.md", "+++\ntemplate = \"post\"\n+++\nhi"),
    ])
    .await;

    assert_eq!(
        body(vfs.open("a.html").await.unwrap()),
        "<main>A&#32;&amp;&#32;B|<p>hi</p>\n</main>"
    );
    assert!(body(vfs.open("b.html").await.unwrap()).starts_with("<article>"));
}

#[tokio::test]
async fn image_folders_get_wrapper_pages() {
    let (_, vfs) = site(&[("photos/cat.jpg", "jpeg bytes"), ("blog/dog.png", "png")]).await;

    let opened = vfs.open("photos/cat.html").await.unwrap();
    let Opened::File(file) = &opened else {
        panic!("expected a file");
    };
    assert_eq!(file.kind, EntryKind::ImageVirtual);
    let html = body(opened);
    assert!(html.contains("cat.jpg"), "{html}");

    assert!(vfs.open("photos/cat.jpg").await.is_ok());
    assert!(vfs.open("blog/dog.html").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn listings_merge_virtual_entries_without_duplicates() {
    let (_, vfs) = site(&[
        ("blog/a.md", "a"),
        ("blog/b.md", "b"),
        ("blog/b.html", "static b"),
        ("blog/style.css", "body {}"),
        ("blog/.hidden", "x"),
        ("blog/sub/c.md", "c"),
    ])
    .await;

    let entries = vfs.read_dir("blog").await.unwrap();
    let names: Vec<(&str, EntryKind)> = entries.iter().map(|e| (e.name(), e.kind)).collect();
    assert_eq!(
        names,
        vec![
            ("a.html", EntryKind::MarkdownVirtual),
            ("b.html", EntryKind::PassThrough),
            ("style.css", EntryKind::PassThrough),
            ("sub", EntryKind::PassThrough),
        ]
    );
    assert!(entries.iter().all(|entry| !entry.name().ends_with(".md")));
}

#[tokio::test]
async fn read_dir_of_a_file_fails() {
    let (_, vfs) = site(&[("a.txt", "a")]).await;
    assert!(vfs.read_dir("a.txt").await.is_err());
    assert!(vfs.read_dir("missing").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn stat_reports_rendered_size() {
    let (_, vfs) = site(&[("a.md", "short")]).await;
    let info = vfs.stat("a.html").await.unwrap();
    let opened = vfs.open("a.html").await.unwrap();
    assert_eq!(info.size, opened.info().size);
    assert!(info.size > "short".len() as u64);
}

#[tokio::test]
async fn site_config_defaults_when_missing() {
    let (store, vfs) = site(&[("a.txt", "a")]).await;
    assert_eq!(vfs.site_config().await.unwrap(), SiteConfig::default());

    store.insert_file("site.toml", "staticexpires = \"2h\"", MODIFIED);
    let config = vfs.site_config().await.unwrap();
    assert_eq!(config.static_expires, Some(std::time::Duration::from_secs(7_200)));
}

#[tokio::test]
async fn reload_bumps_generation_and_keeps_set_on_failure() {
    let (store, vfs) = site(&[("a.md", "body")]).await;
    let first = vfs.template_generation();

    store.insert_file("template/default.html", "new {{{ content }}}", MODIFIED);
    let second = vfs.reload_templates().await.unwrap();
    assert_eq!(second, first + 1);
    assert!(body(vfs.open("a.html").await.unwrap()).starts_with("new "));

    store.insert_file("template/default.html", "{{#if x}}unclosed", MODIFIED);
    assert!(vfs.reload_templates().await.is_err());
    assert_eq!(vfs.template_generation(), second);
    assert!(body(vfs.open("a.html").await.unwrap()).starts_with("new "));
}

#[tokio::test]
async fn unchanged_templates_keep_generation() {
    let (store, vfs) = site(&[
        ("template/default.html", "<main>{{{ content }}}</main>"),
        ("sitemap.txt", "{{#each paths}}{{ this }}\n{{/each}}"),
        ("a.md", "body"),
    ])
    .await;
    let first = vfs.template_generation();

    assert_eq!(vfs.reload_templates().await.unwrap(), first);
    assert_eq!(vfs.template_generation(), first);

    store.insert_file("sitemap.txt", "{{#each paths}}/{{ this }}\n{{/each}}", MODIFIED);
    assert_eq!(vfs.reload_templates().await.unwrap(), first + 1);
    let sitemap = String::from_utf8(vfs.sitemap().await.unwrap().body.to_vec()).unwrap();
    assert!(sitemap.starts_with("/\n/a.html\n"), "{sitemap}");
}

#[tokio::test]
async fn sitemap_added_after_load_waits_for_reload() {
    let (store, vfs) = site(&[("a.md", "body")]).await;
    store.insert_file("sitemap.txt", "{{#each paths}}{{ this }};{{/each}}", MODIFIED);
    assert!(vfs.open("sitemap.txt").await.unwrap_err().is_not_found());

    vfs.reload_templates().await.unwrap();
    assert_eq!(body(vfs.open("sitemap.txt").await.unwrap()), ";a.html;sitemap.txt;");
}

#[tokio::test]
async fn page_templates_list_folders() {
    let newest_first = "reverse (sortbytime (dir page.path))";
    let list = format!("{{{{#each {newest_first}}}}}{{{{ front_matter.title }}}}|{{{{/each}}}}");
    let post = format!(
        "{{{{#with prev ({newest_first}) page.filename}}}}older={{{{ filename }}}}{{{{/with}}}};\
         {{{{#with next ({newest_first}) page.filename}}}}newer={{{{ filename }}}}{{{{/with}}}}"
    );
    let (_, vfs) = site(&[
        ("template/list.html", list.as_str()),
        ("template/post.html", post.as_str()),
        ("blog/index.md", "+++\ntemplate = \"list\"\n+++\n"),
        ("blog/404.md", "missing"),
        (
            "blog/one.md",
            "+++\ntitle = \"One\"\ndate = 2024-01-01\ntemplate = \"post\"\n+++\n",
        ),
        (
            "blog/two.md",
            "+++\ntitle = \"Two\"\ndate = 2024-02-01\ntemplate = \"post\"\n+++\n",
        ),
        (
            "blog/three.md",
            "+++\ntitle = \"Three\"\ndate = 2024-03-01\ntemplate = \"post\"\n+++\n",
        ),
        ("blog/later.md", "+++\ntitle = \"Later\"\ndate = 2999-01-01\n+++\n"),
    ])
    .await;

    assert_eq!(body(vfs.open("blog/index.html").await.unwrap()), "Three|Two|One|");
    assert_eq!(
        body(vfs.open("blog/two.html").await.unwrap()),
        "older=one.html;newer=three.html"
    );
    assert_eq!(body(vfs.open("blog/one.html").await.unwrap()), ";newer=two.html");
    assert_eq!(body(vfs.open("blog/three.html").await.unwrap()), "older=two.html;");
}

#[tokio::test]
async fn front_matter_peek_does_not_render() {
    let (_, vfs) = site(&[
        ("later.md", "+++\ntitle = \"Later\"\ndate = 2999-01-01\n+++\n"),
        ("photos/cat.png", "png"),
        ("plain.txt", "x"),
    ])
    .await;

    let later = vfs.front_matter("later.html").await.unwrap().unwrap();
    assert_eq!(later.title, "Later");
    assert!(later.is_embargoed(OffsetDateTime::now_utc()));

    let cat = vfs.front_matter("photos/cat.html").await.unwrap().unwrap();
    assert_eq!(cat.original_file, "cat.png");

    assert_eq!(vfs.front_matter("plain.txt").await.unwrap(), None);
}

#[tokio::test]
async fn sitemap_lists_visible_paths() {
    let (_, vfs) = site(&[
        (
            "sitemap.txt",
            "{{#each paths}}https://example.com/{{ this }}\n{{/each}}",
        ),
        ("index.md", "home"),
        ("404.md", "missing"),
        ("about.md", "about"),
        ("soon.md", "+++\ndate = 2999-01-01\n+++\n"),
        ("blog/post1.md", "one"),
        ("blog/post2.md", "two"),
        ("photos/cat.png", "png"),
        ("photos/notes.txt", "notes"),
        ("template/default.html", "{{{ content }}}"),
        (".git/config", "x"),
    ])
    .await;

    let sitemap = vfs.sitemap().await.unwrap();
    assert_eq!(sitemap.kind, EntryKind::SitemapVirtual);
    let text = String::from_utf8(sitemap.body.to_vec()).unwrap();
    insta::assert_snapshot!(text, @r"
    https://example.com/
    https://example.com/about.html
    https://example.com/blog/
    https://example.com/blog/post1.html
    https://example.com/blog/post2.html
    https://example.com/photos/
    https://example.com/photos/cat.html
    https://example.com/photos/notes.txt
    https://example.com/sitemap.txt
    ");

    assert_eq!(body(vfs.open("sitemap.txt").await.unwrap()), text);
}
