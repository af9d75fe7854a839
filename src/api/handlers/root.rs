//! Minimal pages so the control surface is usable without a bundled UI.

use axum::response::{Html, IntoResponse};

const LANDING_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>warden</title></head>
<body>
<h1>Control surface</h1>
<p><a href="/control/profile">Profile</a> | <a href="/control/logout">Log out</a></p>
</body>
</html>
"#;

const LOGIN_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>warden login</title></head>
<body>
<form id="login">
<input name="name" autocomplete="username" placeholder="Username">
<input name="password" type="password" autocomplete="current-password" placeholder="Password">
<button type="submit">Log in</button>
</form>
<p id="error"></p>
<script>
document.getElementById("login").addEventListener("submit", async (event) => {
  event.preventDefault();
  const form = new FormData(event.target);
  const response = await fetch("/control/login", {
    method: "POST",
    headers: { "Content-Type": "application/json" },
    body: JSON.stringify({ name: form.get("name"), password: form.get("password") }),
  });
  if (response.ok) {
    window.location.href = "/";
  } else {
    document.getElementById("error").textContent = await response.text();
  }
});
</script>
</body>
</html>
"#;

/// Protected landing page, served for `/` and `/index.html`.
pub async fn root() -> impl IntoResponse {
    Html(LANDING_HTML)
}

pub async fn login_page() -> impl IntoResponse {
    Html(LOGIN_HTML)
}
