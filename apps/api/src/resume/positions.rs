//! Advisory check that a target position and the collected dependencies
//! point the same way. Only ever logged; a mismatch never fails a job.

const BACKEND_TECHS: &[&str] = &[
    "python", "java", "kotlin", "go", "rust", "node.js", "fastapi", "django", "flask",
    "spring", "express", "nestjs", "jpa", "sqlalchemy", "prisma", "typeorm", "hibernate",
    "querydsl", "postgres", "mysql", "mongodb", "redis", "kafka", "rabbitmq", "celery",
    "graphql", "grpc", "gin", "gorm", "axum", "actix", "tokio", "sqlx",
];

const FRONTEND_TECHS: &[&str] = &[
    "javascript", "typescript", "react", "vue", "angular", "next", "nuxt", "svelte",
    "redux", "zustand", "recoil", "mobx", "tailwind", "styled-components", "emotion",
    "mui", "chakra", "webpack", "vite",
];

const MOBILE_TECHS: &[&str] = &[
    "swift", "kotlin", "dart", "swiftui", "compose", "react-native", "flutter",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionKind {
    Backend,
    Frontend,
    Fullstack,
    Mobile,
}

impl PositionKind {
    fn detect(position: &str) -> Option<Self> {
        let lower = position.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if has(&["backend", "back-end", "백엔드", "server"]) {
            Some(PositionKind::Backend)
        } else if has(&["frontend", "front-end", "프론트엔드"]) {
            Some(PositionKind::Frontend)
        } else if has(&["fullstack", "full-stack", "full stack", "풀스택"]) {
            Some(PositionKind::Fullstack)
        } else if has(&["mobile", "ios", "android", "모바일"]) {
            Some(PositionKind::Mobile)
        } else {
            None
        }
    }
}

fn uses_any(deps: &[String], techs: &[&str]) -> bool {
    deps.iter().any(|dep| {
        let dep = dep.to_lowercase();
        techs.iter().any(|tech| dep.contains(tech))
    })
}

/// Returns a description of the mismatch, or `None` when the dependencies
/// fit the position (or the position is not one we classify).
pub fn validate_position_match(position: &str, dependencies: &[String]) -> Option<String> {
    let kind = PositionKind::detect(position)?;

    let backend = uses_any(dependencies, BACKEND_TECHS);
    let frontend = uses_any(dependencies, FRONTEND_TECHS);
    let fits = match kind {
        PositionKind::Backend => backend,
        PositionKind::Frontend => frontend,
        PositionKind::Fullstack => backend || frontend,
        PositionKind::Mobile => uses_any(dependencies, MOBILE_TECHS),
    };

    (!fits).then(|| format!("no {kind:?} technologies found for position '{position}'"))
}
